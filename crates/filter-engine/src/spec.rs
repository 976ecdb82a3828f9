//! 필터 스펙 변환 -- 규칙을 iptables 인자 토큰 열로 변환
//!
//! 토큰 순서는 고정입니다:
//! `-i`, `-o`, `-s`, `-d`, `-p`, `--sport`, `--dport`, `-j`, `-m comment --comment`.
//! 같은 규칙은 항상 같은 토큰 열을 만들므로 append-unique 비교가 안정적입니다.

use std::fmt;

use befw_core::types::Rule;

/// 부정 표시 문자
const NEGATION: char = '!';

/// 규칙 하나에서 만든 엔진 인자 토큰 열
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterSpec {
    tokens: Vec<String>,
}

impl FilterSpec {
    /// 규칙에서 토큰 열을 만듭니다. I/O 없음.
    pub fn from_rule(rule: &Rule) -> Self {
        let mut spec = Self { tokens: Vec::new() };
        spec.push_param("-i", &rule.in_interface);
        spec.push_param("-o", &rule.out_interface);
        spec.push_param("-s", &rule.src_address);
        spec.push_param("-d", &rule.dst_address);
        spec.push_param("-p", &rule.protocol);
        spec.push_param("--sport", &rule.src_port);
        spec.push_param("--dport", &rule.dst_port);
        spec.push_param("-j", &rule.jump);
        spec.push_comment(&rule.comment);
        spec
    }

    /// 이미 분리된 토큰으로 스펙을 만듭니다.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    fn push_param(&mut self, flag: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        match value.strip_prefix(NEGATION) {
            // "!" 단독은 부정할 값이 없으므로 조건을 생략
            Some("") => {}
            Some(rest) => {
                self.tokens.push(NEGATION.to_string());
                self.tokens.push(flag.to_owned());
                self.tokens.push(rest.to_owned());
            }
            None => {
                self.tokens.push(flag.to_owned());
                self.tokens.push(value.to_owned());
            }
        }
    }

    fn push_comment(&mut self, comment: &str) {
        if comment.is_empty() {
            return;
        }
        self.tokens.extend(
            ["-m", "comment", "--comment", comment]
                .iter()
                .map(|t| (*t).to_owned()),
        );
    }

    /// 토큰 열
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 드라이버에 넘길 한 줄 문자열
    ///
    /// 공백이 들어간 토큰은 큰따옴표로 감쌉니다. 엔진 쪽 인자 분리는
    /// 따옴표 이스케이프를 지원하지 않으므로 토큰 안의 따옴표 문자는 제거됩니다.
    pub fn to_rule_string(&self) -> String {
        self.tokens
            .iter()
            .map(|token| {
                if token.is_empty() || token.chars().any(char::is_whitespace) {
                    let cleaned: String = token.chars().filter(|c| *c != '"' && *c != '\'').collect();
                    format!("\"{cleaned}\"")
                } else {
                    token.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}
