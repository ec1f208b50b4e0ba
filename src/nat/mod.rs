//! NAT 穿透能力评估
//!
//! IP 版本划分、候选地址分类和评级档位

pub mod scoring;

pub use scoring::{PassTally, PassVerdict, TurnFlag, UriVerdict};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 测试轮次的 IP 版本
///
/// 指的是候选地址的 IP 版本，而不是访问 STUN/TURN 服务器本身所用的协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    #[serde(rename = "IPv4")]
    V4,
    #[serde(rename = "IPv6")]
    V6,
}

impl IpVersion {
    /// 默认测试顺序
    pub const ALL: [IpVersion; 2] = [IpVersion::V4, IpVersion::V6];

    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "IPv4",
            IpVersion::V6 => "IPv6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ipv4" | "v4" | "4" => Ok(IpVersion::V4),
            "ipv6" | "v6" | "6" => Ok(IpVersion::V6),
            _ => Err(format!("unknown IP version: {}", s)),
        }
    }
}

/// 候选地址分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    V4,
    V6,
    /// 既不是 IPv4 也不是 IPv6，例如 mDNS 主机名
    Other,
}

impl AddressClass {
    /// 该地址是否属于指定的 IP 版本
    pub fn matches(self, version: IpVersion) -> bool {
        matches!(
            (self, version),
            (AddressClass::V4, IpVersion::V4) | (AddressClass::V6, IpVersion::V6)
        )
    }
}

/// 对候选地址进行分类
///
/// 点分四组 1-3 位数字为 IPv4；包含冒号为 IPv6；其余为 `Other`
pub fn classify_address(address: &str) -> AddressClass {
    if is_dotted_quad(address) {
        AddressClass::V4
    } else if address.contains(':') {
        AddressClass::V6
    } else {
        AddressClass::Other
    }
}

fn is_dotted_quad(address: &str) -> bool {
    let groups: Vec<&str> = address.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}

/// NAT 穿透能力评级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Excellent,
    Great,
    Good,
    Poor,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Excellent => "Excellent",
            Verdict::Great => "Great",
            Verdict::Good => "Good",
            Verdict::Poor => "Poor",
            Verdict::Fail => "Fail",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ipv4() {
        assert_eq!(classify_address("10.0.0.5"), AddressClass::V4);
        assert_eq!(classify_address("192.168.100.254"), AddressClass::V4);
        assert!(classify_address("10.0.0.5").matches(IpVersion::V4));
        assert!(!classify_address("10.0.0.5").matches(IpVersion::V6));
    }

    #[test]
    fn test_classify_ipv6() {
        assert_eq!(classify_address("2001:db8::1"), AddressClass::V6);
        assert_eq!(classify_address("::ffff:10.0.0.1"), AddressClass::V6);
        assert!(classify_address("2001:db8::1").matches(IpVersion::V6));
    }

    #[test]
    fn test_classify_other() {
        let class = classify_address("abc.local");
        assert_eq!(class, AddressClass::Other);
        assert!(!class.matches(IpVersion::V4));
        assert!(!class.matches(IpVersion::V6));

        // 组数或位数不对的点分地址不算 IPv4
        assert_eq!(classify_address("1.2.3"), AddressClass::Other);
        assert_eq!(classify_address("1234.2.3.4"), AddressClass::Other);
        assert_eq!(
            classify_address("0d3f1e5c-8c3e-4b1a.local"),
            AddressClass::Other
        );
    }

    #[test]
    fn test_ip_version_parse() {
        assert_eq!("IPv4".parse::<IpVersion>().unwrap(), IpVersion::V4);
        assert_eq!("ipv6".parse::<IpVersion>().unwrap(), IpVersion::V6);
        assert!("ipv5".parse::<IpVersion>().is_err());
    }

    #[test]
    fn test_ip_version_serialization() {
        assert_eq!(serde_json::to_string(&IpVersion::V4).unwrap(), "\"IPv4\"");
        assert_eq!(IpVersion::V6.to_string(), "IPv6");
    }
}
