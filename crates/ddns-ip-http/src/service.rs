//! Catalogue of public "what is my IP" services
//!
//! Most of these are pages meant for humans; the address is scraped out of
//! the HTML. Ipify is the default since it answers with bare text.

use crate::extract::IpExtractor;
use ddns_core::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Charset of UTF-8 pages
pub const UTF8: &str = "utf-8";
/// Charset of the older Chinese pages
pub const GBK: &str = "gbk";

const IPV4: &str = r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}";

/// A known IP detection service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IpService {
    #[default]
    Ipify,
    Aliyun,
    Chinaz,
    Ip138,
    Ip5,
    Qq,
    Sohu,
    Szbendibao,
    Telize,
    WhatIsMyIp,
    Win7sky,
}

impl IpService {
    /// Every service, default first
    pub const ALL: [IpService; 11] = [
        IpService::Ipify,
        IpService::Aliyun,
        IpService::Chinaz,
        IpService::Ip138,
        IpService::Ip5,
        IpService::Qq,
        IpService::Sohu,
        IpService::Szbendibao,
        IpService::Telize,
        IpService::WhatIsMyIp,
        IpService::Win7sky,
    ];

    /// Lowercase name, as accepted by [`FromStr`]
    pub fn name(&self) -> &'static str {
        match self {
            IpService::Ipify => "ipify",
            IpService::Aliyun => "aliyun",
            IpService::Chinaz => "chinaz",
            IpService::Ip138 => "ip138",
            IpService::Ip5 => "ip5",
            IpService::Qq => "qq",
            IpService::Sohu => "sohu",
            IpService::Szbendibao => "szbendibao",
            IpService::Telize => "telize",
            IpService::WhatIsMyIp => "whatismyip",
            IpService::Win7sky => "win7sky",
        }
    }

    /// Page to fetch
    pub fn url(&self) -> &'static str {
        match self {
            IpService::Ipify => "https://api.ipify.org",
            IpService::Aliyun => "http://ip.aliyun.com/service/getIpInfo.php?ip=myip",
            IpService::Chinaz => "http://ip.chinaz.com/getip.aspx",
            IpService::Ip138 => "http://1111.ip138.com/ic.asp",
            IpService::Ip5 => "http://www.ip5.me/",
            IpService::Qq => "http://ip.qq.com/",
            IpService::Sohu => "http://txt.go.sohu.com/ip/soip",
            IpService::Szbendibao => "http://sz.bendibao.com/ip/ip.asp",
            IpService::Telize => "http://www.telize.com/ip",
            IpService::WhatIsMyIp => "http://www.whatismyip.com.tw/",
            IpService::Win7sky => "http://win7sky.com/ip/",
        }
    }

    /// Charset used when the response does not declare one
    pub fn charset(&self) -> &'static str {
        match self {
            IpService::Ip138
            | IpService::Ip5
            | IpService::Qq
            | IpService::Szbendibao
            | IpService::Win7sky => GBK,
            _ => UTF8,
        }
    }

    /// How to find the address in this service's page
    pub fn extractor(&self) -> Result<IpExtractor> {
        let pattern = match self {
            IpService::Ipify | IpService::Telize => return Ok(IpExtractor::PlainText),
            IpService::Aliyun => return Ok(IpExtractor::json_pointer("/data/ip")),
            // Loose JSON: {ip:'1.2.3.4',address:'...'}
            IpService::Chinaz => format!(r#"ip\s*:\s*['"]({})['"]"#, IPV4),
            IpService::Ip138 => format!(r"\[({})\]", IPV4),
            IpService::Ip5 => format!(r#"<div id="ip_addr" style="color:#191970">({})</div>"#, IPV4),
            IpService::Qq => format!(r#"您当前的IP为：<span class="red">({})</span>"#, IPV4),
            IpService::Sohu => format!(r#"window\.sohu_user_ip="({})""#, IPV4),
            IpService::Szbendibao => format!(r"你的电脑的公网IP地址：({})", IPV4),
            IpService::WhatIsMyIp => format!(r"<h2>({})</h2>", IPV4),
            IpService::Win7sky => format!(
                r"您的IP地址是：\[<font color=#FF0000>({})</font>\]",
                IPV4
            ),
        };

        IpExtractor::pattern(&pattern)
    }
}

impl fmt::Display for IpService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IpService {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        IpService::ALL
            .into_iter()
            .find(|service| service.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let known: Vec<&str> = IpService::ALL.iter().map(IpService::name).collect();
                Error::config(format!(
                    "Unknown IP service: {} (expected one of: {})",
                    wanted,
                    known.join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn extract(service: IpService, body: &str) -> Result<Ipv4Addr> {
        service.extractor()?.extract(body)
    }

    #[test]
    fn every_service_has_a_working_extractor() {
        for service in IpService::ALL {
            assert!(service.extractor().is_ok(), "{} extractor", service);
        }
    }

    #[test]
    fn names_parse_back() {
        for service in IpService::ALL {
            assert_eq!(service.name().parse::<IpService>().unwrap(), service);
        }
        assert_eq!("WhatIsMyIp".parse::<IpService>().unwrap(), IpService::WhatIsMyIp);
        assert_eq!(IpService::default(), IpService::Ipify);
    }

    #[test]
    fn unknown_name_lists_choices() {
        let err = "myip".parse::<IpService>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("ipify"));
    }

    #[test]
    fn gbk_pages() {
        assert_eq!(IpService::Ip138.charset(), GBK);
        assert_eq!(IpService::Win7sky.charset(), GBK);
        assert_eq!(IpService::Sohu.charset(), UTF8);
        assert_eq!(IpService::Ipify.charset(), UTF8);
    }

    #[test]
    fn scraped_pages() {
        let expected = Ipv4Addr::new(203, 0, 113, 7);
        let samples = [
            (IpService::Chinaz, "({ip:'203.0.113.7',address:'浙江省杭州市 电信'})"),
            (IpService::Ip138, "<center>您的IP是：[203.0.113.7] 来自：浙江省杭州市 电信</center>"),
            (
                IpService::Ip5,
                r#"<td><div id="ip_addr" style="color:#191970">203.0.113.7</div></td>"#,
            ),
            (
                IpService::Qq,
                r#"<p>您当前的IP为：<span class="red">203.0.113.7</span></p>"#,
            ),
            (IpService::Sohu, r#"window.sohu_user_ip="203.0.113.7";sohu_IP_Loc="zj";"#),
            (IpService::Szbendibao, "<p>你的电脑的公网IP地址：203.0.113.7</p>"),
            (IpService::Telize, "203.0.113.7\n"),
            (IpService::WhatIsMyIp, "<b>IP位址</b><h2>203.0.113.7</h2>"),
            (
                IpService::Win7sky,
                "您的IP地址是：[<font color=#FF0000>203.0.113.7</font>]",
            ),
            (
                IpService::Aliyun,
                r#"{"code":0,"data":{"country":"中国","ip":"203.0.113.7"}}"#,
            ),
        ];

        for (service, body) in samples {
            assert_eq!(extract(service, body).unwrap(), expected, "{}", service);
        }
    }

    #[test]
    fn page_without_address_is_a_parse_error() {
        let err = extract(IpService::Sohu, "<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
