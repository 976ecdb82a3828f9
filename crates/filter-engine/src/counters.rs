//! 슬롯 카운터 -- `iptables -L CHAIN -n -v -x` 출력 파싱

use crate::error::FilterEngineError;

/// 체인 슬롯 하나의 누적 카운터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounter {
    pub packets: u64,
    pub bytes: u64,
}

impl SlotCounter {
    pub fn new(packets: u64, bytes: u64) -> Self {
        Self { packets, bytes }
    }
}

/// 체인 목록 출력에서 슬롯 순서대로 카운터를 읽습니다.
///
/// 처음 두 줄(체인 헤더, 컬럼 헤더)을 건너뛰고, 나머지 각 줄의
/// 첫 두 필드를 패킷 수와 바이트 수로 해석합니다.
/// ```text
/// Chain BEFW (0 references)
///     pkts      bytes target     prot opt in     out     source               destination
///       12     3400 ACCEPT     tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:443
/// ```
pub fn parse_listing(chain: &str, listing: &str) -> Result<Vec<SlotCounter>, FilterEngineError> {
    let mut counters = Vec::new();
    for line in listing.lines().skip(2) {
        let mut fields = line.split_whitespace();
        let Some(packets) = fields.next() else {
            continue;
        };
        let bytes = fields.next().ok_or_else(|| FilterEngineError::CounterParse {
            chain: chain.to_owned(),
            reason: format!("missing byte count in line '{}'", line.trim()),
        })?;
        counters.push(SlotCounter {
            packets: parse_count(chain, packets)?,
            bytes: parse_count(chain, bytes)?,
        });
    }
    Ok(counters)
}

fn parse_count(chain: &str, raw: &str) -> Result<u64, FilterEngineError> {
    raw.parse::<u64>()
        .map_err(|e| FilterEngineError::CounterParse {
            chain: chain.to_owned(),
            reason: format!("invalid count '{raw}': {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Chain BEFW (0 references)
    pkts      bytes target     prot opt in     out     source               destination
      12     3400 ACCEPT     tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:443
       0        0 ACCEPT     tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:8080 /* web alt */
";

    #[test]
    fn parses_slots_in_order() {
        let counters = parse_listing("filter/BEFW", LISTING).unwrap();
        assert_eq!(
            counters,
            vec![SlotCounter::new(12, 3400), SlotCounter::new(0, 0)]
        );
    }

    #[test]
    fn empty_chain_has_no_slots() {
        let listing = "Chain BEFW (0 references)\n    pkts      bytes target     prot opt in     out     source               destination\n";
        assert!(parse_listing("filter/BEFW", listing).unwrap().is_empty());
    }

    #[test]
    fn blank_lines_are_ignored() {
        let listing = format!("{LISTING}\n\n");
        assert_eq!(parse_listing("filter/BEFW", &listing).unwrap().len(), 2);
    }

    #[test]
    fn non_numeric_count_is_an_error() {
        let listing = "Chain X\nheader\n  12K  3M ACCEPT all -- * * 0.0.0.0/0 0.0.0.0/0\n";
        let err = parse_listing("filter/X", listing).unwrap_err();
        assert!(matches!(err, FilterEngineError::CounterParse { .. }));
    }

    #[test]
    fn large_counters_fit_u64() {
        let listing = "Chain X\nheader\n 18446744073709551615 18446744073709551615 DROP all\n";
        let counters = parse_listing("filter/X", listing).unwrap();
        assert_eq!(counters[0].packets, u64::MAX);
    }
}
