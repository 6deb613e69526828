use lazy_static::lazy_static;
use regex::Regex;

/// Coarse client description recorded on each session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device: String,
    pub browser: String,
    pub os: String,
}

const UNKNOWN: &str = "Unknown";

lazy_static! {
    static ref TABLET_RE: Regex = Regex::new(r"(?i)ipad|tablet|kindle|silk|playbook").unwrap();
    static ref MOBILE_RE: Regex =
        Regex::new(r"(?i)mobi|iphone|ipod|android.*mobile|windows phone|blackberry").unwrap();
    static ref BOT_RE: Regex = Regex::new(r"(?i)bot|crawler|spider|curl|wget|httpie").unwrap();

    // Order matters: Edge and Opera also announce Chrome, Chrome also announces Safari.
    static ref BROWSERS: Vec<(&'static str, Regex)> = vec![
        ("Edge", Regex::new(r"Edg(?:e|A|iOS)?/([\d.]+)").unwrap()),
        ("Opera", Regex::new(r"(?:OPR|Opera)/([\d.]+)").unwrap()),
        ("Samsung Internet", Regex::new(r"SamsungBrowser/([\d.]+)").unwrap()),
        ("Firefox", Regex::new(r"(?:Firefox|FxiOS)/([\d.]+)").unwrap()),
        ("Chrome", Regex::new(r"(?:Chrome|CriOS)/([\d.]+)").unwrap()),
        ("Safari", Regex::new(r"Version/([\d.]+).*Safari/").unwrap()),
        ("Internet Explorer", Regex::new(r"(?:MSIE |Trident/.*rv:)([\d.]+)").unwrap()),
    ];

    static ref OSES: Vec<(&'static str, Regex)> = vec![
        ("Windows", Regex::new(r"Windows NT ([\d.]+)").unwrap()),
        ("iOS", Regex::new(r"(?:iPhone|iPad|iPod).*? OS ([\d_]+)").unwrap()),
        ("Android", Regex::new(r"Android ([\d.]+)").unwrap()),
        ("macOS", Regex::new(r"Mac OS X ([\d_.]+)").unwrap()),
        ("Chrome OS", Regex::new(r"CrOS \S+ ([\d.]+)").unwrap()),
        ("Linux", Regex::new(r"Linux()").unwrap()),
    ];
}

fn major(version: &str) -> &str {
    version.split(['.', '_']).next().unwrap_or(version)
}

fn classify(table: &[(&'static str, Regex)], ua: &str) -> String {
    for (name, re) in table {
        if let Some(caps) = re.captures(ua) {
            return match caps.get(1).map(|m| m.as_str()).filter(|v| !v.is_empty()) {
                Some(v) => format!("{} {}", name, major(v)),
                None => (*name).to_string(),
            };
        }
    }
    UNKNOWN.to_string()
}

pub fn parse(user_agent: Option<&str>) -> DeviceInfo {
    let Some(ua) = user_agent.map(str::trim).filter(|s| !s.is_empty()) else {
        return DeviceInfo {
            device: UNKNOWN.into(),
            browser: UNKNOWN.into(),
            os: UNKNOWN.into(),
        };
    };

    let device = if BOT_RE.is_match(ua) {
        "Bot"
    } else if TABLET_RE.is_match(ua) {
        "Tablet"
    } else if MOBILE_RE.is_match(ua) {
        "Mobile"
    } else {
        "Desktop"
    };

    DeviceInfo {
        device: device.into(),
        browser: classify(&BROWSERS, ua),
        os: classify(&OSES, ua),
    }
}
