//! 도메인 타입 -- 정책 문서, 필터 규칙, 카운터 통계
//!
//! 컨트롤 플레인과 주고받는 JSON 문서의 구조를 정의합니다.
//! 필드 이름은 와이어 형식(`in-interface`, `address-lists` 등)을 따릅니다.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// 규칙 추가 방식
///
/// 와이어 형식에서는 문자열입니다. `"insert"`만 [`RuleAction::Insert`]이고
/// 그 외 모든 값(빈 문자열 포함)은 [`RuleAction::Append`]로 취급합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleAction {
    /// 체인 끝에 추가 (동일 규칙이 있으면 생략)
    #[default]
    Append,
    /// 지정한 위치에 삽입
    Insert,
}

impl RuleAction {
    /// 와이어 형식 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Insert => "insert",
        }
    }

    /// 기본 동작(append) 여부
    pub fn is_append(&self) -> bool {
        matches!(self, Self::Append)
    }
}

impl From<String> for RuleAction {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("insert") {
            Self::Insert
        } else {
            Self::Append
        }
    }
}

impl From<RuleAction> for String {
    fn from(action: RuleAction) -> Self {
        action.as_str().to_owned()
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 필터 규칙
///
/// 정책 스냅샷의 한 항목입니다. 매치 필드는 문자열 그대로 보관하며,
/// 값이 `!`로 시작하면 해당 조건의 부정을 의미합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// 컨트롤 플레인이 부여한 규칙 식별자
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub id: String,
    /// iptables 테이블
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub table: String,
    /// 체인 이름
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub chain: String,
    /// insert 위치 (1부터 시작, 0은 미지정)
    #[serde(
        rename = "rulenum",
        skip_serializing_if = "is_zero",
        deserialize_with = "lenient_position"
    )]
    pub position: u32,
    #[serde(
        rename = "in-interface",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub in_interface: String,
    #[serde(
        rename = "out-interface",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub out_interface: String,
    #[serde(
        rename = "src-address",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub src_address: String,
    #[serde(
        rename = "dst-address",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub dst_address: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub protocol: String,
    #[serde(
        rename = "src-port",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub src_port: String,
    #[serde(
        rename = "dst-port",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub dst_port: String,
    /// append/insert
    #[serde(skip_serializing_if = "RuleAction::is_append", deserialize_with = "null_as_default")]
    pub action: RuleAction,
    /// 점프 대상 (ACCEPT, DROP, 사용자 체인 등)
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub jump: String,
    /// 주석
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub comment: String,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl Rule {
    /// 규칙이 속한 (테이블, 체인)
    pub fn chain_ref(&self) -> ChainRef {
        ChainRef::new(&self.table, &self.chain)
    }

    /// 로그용 식별자 (비어 있으면 자리표시자)
    pub fn display_id(&self) -> &str {
        if self.id.is_empty() {
            "<unassigned>"
        } else {
            &self.id
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} {} -> {}",
            self.display_id(),
            self.table,
            self.chain,
            self.action,
            if self.jump.is_empty() { "-" } else { &self.jump },
        )
    }
}

/// (테이블, 체인) 쌍
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainRef {
    pub table: String,
    pub chain: String,
}

impl ChainRef {
    pub fn new(table: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            chain: chain.into(),
        }
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.chain)
    }
}

/// 규칙 목록에서 (테이블, 체인) 쌍을 처음 등장한 순서대로 중복 없이 모읍니다.
pub fn distinct_chains(rules: &[Rule]) -> Vec<ChainRef> {
    let mut seen = HashSet::new();
    let mut chains = Vec::new();
    for rule in rules {
        let chain = rule.chain_ref();
        if seen.insert(chain.clone()) {
            chains.push(chain);
        }
    }
    chains
}

/// 주소 목록
///
/// 스냅샷에 보관만 하며 엔진에 반영하지는 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressList {
    /// 목록 이름
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// 호스트 (주소 또는 CIDR)
    #[serde(deserialize_with = "null_as_default")]
    pub host: String,
}

/// 규칙 하나의 카운터 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleStat {
    /// 규칙 식별자
    pub id: String,
    /// 패킷 수
    #[serde(rename = "pkts")]
    pub packets: u64,
    /// 바이트 수
    pub bytes: u64,
}

/// 컨트롤 플레인과 주고받는 정책 문서
///
/// 배열 필드가 `null`이거나 없으면 빈 목록으로 해석합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub rules: Vec<Rule>,
    #[serde(
        rename = "address-lists",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub address_lists: Vec<AddressList>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub stats: Vec<RuleStat>,
}

impl PolicyDocument {
    /// 테넌트의 특정 테이블 규칙을 요청하는 조회 문서
    ///
    /// `{"tenant":T,"rules":[{"table":TABLE}]}`
    pub fn policy_query(tenant: &str, table: &str) -> Self {
        Self {
            tenant: tenant.to_owned(),
            rules: vec![Rule {
                table: table.to_owned(),
                ..Rule::default()
            }],
            ..Self::default()
        }
    }
}

/// 카운터 보고 문서
///
/// `{"tenant":T,"stats":[...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub tenant: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stats: Vec<RuleStat>,
}

impl StatsReport {
    pub fn new(tenant: impl Into<String>, stats: Vec<RuleStat>) -> Self {
        Self {
            tenant: tenant.into(),
            stats,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `null`, 음수, `u32` 범위 밖의 위치는 미지정(0)으로 읽습니다.
fn lenient_position<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|n| u32::try_from(n).ok()).unwrap_or(0))
}
