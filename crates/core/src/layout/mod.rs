//! Result table column detection.
//!
//! Maps header texts to the 1-based column positions of the standard seat,
//! premium seat and waitlist cells. Anything ambiguous falls back to the
//! configured default mapping.

use serde::{Deserialize, Serialize};

/// The seat columns the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Standard,
    Premium,
    Waitlist,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 3] = [Self::Standard, Self::Premium, Self::Waitlist];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Waitlist => "waitlist",
        }
    }
}

/// 1-based column positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub standard: usize,
    pub premium: usize,
    pub waitlist: usize,
}

impl ColumnMap {
    pub fn column(&self, role: ColumnRole) -> usize {
        match role {
            ColumnRole::Standard => self.standard,
            ColumnRole::Premium => self.premium,
            ColumnRole::Waitlist => self.waitlist,
        }
    }

    fn is_distinct(&self) -> bool {
        self.standard != self.premium
            && self.standard != self.waitlist
            && self.premium != self.waitlist
    }
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            standard: 7,
            premium: 6,
            waitlist: 8,
        }
    }
}

/// Header keywords and the fallback mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default)]
    pub default_columns: ColumnMap,

    #[serde(default = "default_standard_keywords")]
    pub standard_keywords: Vec<String>,

    #[serde(default = "default_premium_keywords")]
    pub premium_keywords: Vec<String>,

    #[serde(default = "default_waitlist_keywords")]
    pub waitlist_keywords: Vec<String>,
}

fn default_standard_keywords() -> Vec<String> {
    vec!["일반실".into(), "standard".into(), "general".into()]
}

fn default_premium_keywords() -> Vec<String> {
    vec!["특실".into(), "premium".into(), "first".into()]
}

fn default_waitlist_keywords() -> Vec<String> {
    vec!["예약대기".into(), "waitlist".into(), "standby".into()]
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            default_columns: ColumnMap::default(),
            standard_keywords: default_standard_keywords(),
            premium_keywords: default_premium_keywords(),
            waitlist_keywords: default_waitlist_keywords(),
        }
    }
}

impl LayoutConfig {
    fn keywords(&self, role: ColumnRole) -> &[String] {
        match role {
            ColumnRole::Standard => &self.standard_keywords,
            ColumnRole::Premium => &self.premium_keywords,
            ColumnRole::Waitlist => &self.waitlist_keywords,
        }
    }
}

/// Result of [`detect_columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDetection {
    pub columns: ColumnMap,
    /// Set when the default mapping was used, with the reason.
    pub fallback: Option<String>,
}

impl LayoutDetection {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Detect seat columns from header texts (case-insensitive keyword match).
pub fn detect_columns<S: AsRef<str>>(headers: &[S], config: &LayoutConfig) -> LayoutDetection {
    let fallback = |reason: String| LayoutDetection {
        columns: config.default_columns,
        fallback: Some(reason),
    };

    if headers.is_empty() {
        return fallback("no header cells".to_string());
    }

    let lowered: Vec<String> = headers
        .iter()
        .map(|h| h.as_ref().trim().to_lowercase())
        .collect();

    let find = |role: ColumnRole| -> Option<usize> {
        let keywords: Vec<String> = config
            .keywords(role)
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        lowered
            .iter()
            .position(|h| keywords.iter().any(|k| !k.is_empty() && h.contains(k.as_str())))
            .map(|i| i + 1)
    };

    let mut found = [0usize; 3];
    for (slot, role) in found.iter_mut().zip(ColumnRole::ALL) {
        match find(role) {
            Some(column) => *slot = column,
            None => return fallback(format!("no header matches {} column", role.as_str())),
        }
    }

    let columns = ColumnMap {
        standard: found[0],
        premium: found[1],
        waitlist: found[2],
    };

    if !columns.is_distinct() {
        return fallback(format!("header columns collide: {:?}", columns));
    }
    if found.iter().any(|&c| c == 0 || c > headers.len()) {
        return fallback(format!("header column out of bounds: {:?}", columns));
    }

    LayoutDetection {
        columns,
        fallback: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srt_headers() -> Vec<&'static str> {
        vec![
            "구분", "열차번호", "출발역", "도착역", "소요시간", "특실", "일반실", "예약대기",
        ]
    }

    #[test]
    fn test_detects_standard_layout() {
        let detection = detect_columns(&srt_headers(), &LayoutConfig::default());
        assert!(!detection.is_fallback());
        assert_eq!(detection.columns, ColumnMap { standard: 7, premium: 6, waitlist: 8 });
    }

    #[test]
    fn test_detects_shifted_layout() {
        let headers = ["Train", "Premium", "Standard", "Standby", "Fare"];
        let detection = detect_columns(&headers, &LayoutConfig::default());
        assert_eq!(detection.columns, ColumnMap { standard: 3, premium: 2, waitlist: 4 });
        assert_eq!(detection.fallback, None);
    }

    #[test]
    fn test_missing_role_falls_back() {
        let headers = ["구분", "특실", "일반실"];
        let detection = detect_columns(&headers, &LayoutConfig::default());
        assert_eq!(detection.columns, ColumnMap::default());
        assert!(detection.fallback.unwrap().contains("waitlist"));
    }

    #[test]
    fn test_colliding_roles_fall_back() {
        let headers = ["standard / premium", "예약대기"];
        let detection = detect_columns(&headers, &LayoutConfig::default());
        assert!(detection.is_fallback());
        assert_eq!(detection.columns, ColumnMap::default());
    }

    #[test]
    fn test_empty_headers_fall_back() {
        let headers: [&str; 0] = [];
        let config = LayoutConfig {
            default_columns: ColumnMap { standard: 3, premium: 2, waitlist: 4 },
            ..Default::default()
        };
        let detection = detect_columns(&headers, &config);
        assert_eq!(detection.columns.standard, 3);
        assert!(detection.is_fallback());
    }

    #[test]
    fn test_deserialize_layout_config() {
        let toml = r#"
            standard_keywords = ["Economy"]
            [default_columns]
            standard = 4
            premium = 3
            waitlist = 5
        "#;
        let config: LayoutConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_columns.standard, 4);
        assert_eq!(config.premium_keywords, default_premium_keywords());

        let detection = detect_columns(&["x", "First", "ECONOMY class", "waitlist"], &config);
        assert_eq!(detection.columns, ColumnMap { standard: 3, premium: 2, waitlist: 4 });
    }
}
