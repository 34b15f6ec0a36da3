//! Site configuration: URLs, locators and keyword sets.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::driver::Locator;
use crate::layout::LayoutConfig;
use crate::pacing::PacingConfig;

/// Everything the attempt engine needs to know about the booking site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_login_url")]
    pub login_url: String,

    #[serde(default = "default_search_url")]
    pub search_url: String,

    #[serde(default = "default_login_id_field")]
    pub login_id_field: Locator,

    #[serde(default = "default_login_password_field")]
    pub login_password_field: Locator,

    #[serde(default = "default_login_submit")]
    pub login_submit: Locator,

    /// Login dialog substrings that mean "try again shortly" rather than
    /// "wrong credentials".
    #[serde(default = "default_transient_login_patterns")]
    pub transient_login_patterns: Vec<String>,

    #[serde(default = "default_origin_field")]
    pub origin_field: Locator,

    #[serde(default = "default_destination_field")]
    pub destination_field: Locator,

    /// `<select>` whose option values are `YYYYMMDD` dates.
    #[serde(default = "default_date_select")]
    pub date_select: Locator,

    /// `<select>` of departure time slots.
    #[serde(default = "default_time_select")]
    pub time_select: Locator,

    #[serde(default = "default_query_button")]
    pub query_button: Locator,

    #[serde(default = "default_result_rows")]
    pub result_rows: Locator,

    #[serde(default = "default_result_headers")]
    pub result_headers: Locator,

    /// Cells within a result row.
    #[serde(default = "default_cell")]
    pub cell: Locator,

    /// Actionable control within a cell.
    #[serde(default = "default_control")]
    pub control: Locator,

    /// CSS fragment appended to `nth-child` paths when re-locating a control.
    #[serde(default = "default_control_path")]
    pub control_path: String,

    /// Attributes consulted for a control's accessible label.
    #[serde(default = "default_label_attributes")]
    pub label_attributes: Vec<String>,

    /// 1-based cell that names the carrier of a row.
    #[serde(default = "default_carrier_column")]
    pub carrier_column: usize,

    #[serde(default = "default_reserve_keywords")]
    pub reserve_keywords: Vec<String>,

    #[serde(default = "default_waitlist_keywords")]
    pub waitlist_keywords: Vec<String>,

    /// Probes that confirm a reservation, tried in order.
    #[serde(default = "default_success_probes")]
    pub reserve_success: Vec<SuccessProbe>,

    /// Probes that confirm a waitlist entry, tried in order.
    #[serde(default = "default_success_probes")]
    pub waitlist_success: Vec<SuccessProbe>,

    #[serde(default)]
    pub carrier_filter: CarrierFilterConfig,

    #[serde(default = "default_dialog_timeout")]
    pub dialog_timeout_ms: u64,

    #[serde(default = "default_new_window_timeout")]
    pub new_window_timeout_ms: u64,

    #[serde(default = "default_success_timeout")]
    pub success_timeout_ms: u64,
}

/// A way to recognise the success page after a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessProbe {
    /// An element matching the locator exists.
    Marker(Locator),
    /// The current URL contains the substring.
    UrlContains(String),
}

/// How to find the carrier filter control on the search form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierFilterConfig {
    /// Known position of the filter control.
    #[serde(default = "default_fixed_position")]
    pub fixed_position: Option<Locator>,

    /// XPath template; `{carrier}` is replaced with the carrier name.
    #[serde(default = "default_sibling_template")]
    pub sibling_template: Option<String>,

    /// Candidate controls scanned by attribute.
    #[serde(default = "default_scan")]
    pub scan: Locator,

    #[serde(default = "default_scan_attributes")]
    pub scan_attributes: Vec<String>,
}

impl Default for CarrierFilterConfig {
    fn default() -> Self {
        Self {
            fixed_position: default_fixed_position(),
            sibling_template: default_sibling_template(),
            scan: default_scan(),
            scan_attributes: default_scan_attributes(),
        }
    }
}

fn default_login_url() -> String {
    "https://etk.srail.co.kr/cmc/01/selectLoginForm.do".to_string()
}

fn default_search_url() -> String {
    "https://etk.srail.kr/hpg/hra/01/selectScheduleList.do".to_string()
}

fn default_login_id_field() -> Locator {
    Locator::id("srchDvNm01")
}

fn default_login_password_field() -> Locator {
    Locator::id("hmpgPwdCphd01")
}

fn default_login_submit() -> Locator {
    Locator::css("input.loginSubmit")
}

fn default_transient_login_patterns() -> Vec<String> {
    vec![
        "잠시 후".into(),
        "다시 시도".into(),
        "일시적".into(),
        "try again".into(),
    ]
}

fn default_origin_field() -> Locator {
    Locator::id("dptRsStnCdNm")
}

fn default_destination_field() -> Locator {
    Locator::id("arvRsStnCdNm")
}

fn default_date_select() -> Locator {
    Locator::id("dptDt")
}

fn default_time_select() -> Locator {
    Locator::id("dptTm")
}

fn default_query_button() -> Locator {
    Locator::xpath("//input[@value='조회하기']")
}

fn default_result_rows() -> Locator {
    Locator::css("#result-form > fieldset > div.tbl_wrap.th_thead > table > tbody > tr")
}

fn default_result_headers() -> Locator {
    Locator::css("#result-form > fieldset > div.tbl_wrap.th_thead > table > thead > tr > th")
}

fn default_cell() -> Locator {
    Locator::css("td")
}

fn default_control() -> Locator {
    Locator::css("a, button, input[type='button'], input[type='submit']")
}

fn default_control_path() -> String {
    "a".to_string()
}

fn default_label_attributes() -> Vec<String> {
    vec!["aria-label".into(), "title".into(), "value".into()]
}

fn default_carrier_column() -> usize {
    1
}

fn default_reserve_keywords() -> Vec<String> {
    vec!["예약하기".into()]
}

fn default_waitlist_keywords() -> Vec<String> {
    vec!["신청하기".into()]
}

fn default_success_probes() -> Vec<SuccessProbe> {
    vec![SuccessProbe::Marker(Locator::id("isFalseGotoMain"))]
}

fn default_fixed_position() -> Option<Locator> {
    Some(Locator::xpath("(//input[@name='trnGpCd'])[2]"))
}

fn default_sibling_template() -> Option<String> {
    Some("//label[contains(normalize-space(.), '{carrier}')]/preceding-sibling::input[1]".into())
}

fn default_scan() -> Locator {
    Locator::css("input[type='radio'], input[type='checkbox']")
}

fn default_scan_attributes() -> Vec<String> {
    vec!["value".into(), "title".into(), "aria-label".into(), "id".into()]
}

fn default_dialog_timeout() -> u64 {
    1500
}

fn default_new_window_timeout() -> u64 {
    1000
}

fn default_success_timeout() -> u64 {
    3000
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            search_url: default_search_url(),
            login_id_field: default_login_id_field(),
            login_password_field: default_login_password_field(),
            login_submit: default_login_submit(),
            transient_login_patterns: default_transient_login_patterns(),
            origin_field: default_origin_field(),
            destination_field: default_destination_field(),
            date_select: default_date_select(),
            time_select: default_time_select(),
            query_button: default_query_button(),
            result_rows: default_result_rows(),
            result_headers: default_result_headers(),
            cell: default_cell(),
            control: default_control(),
            control_path: default_control_path(),
            label_attributes: default_label_attributes(),
            carrier_column: default_carrier_column(),
            reserve_keywords: default_reserve_keywords(),
            waitlist_keywords: default_waitlist_keywords(),
            reserve_success: default_success_probes(),
            waitlist_success: default_success_probes(),
            carrier_filter: CarrierFilterConfig::default(),
            dialog_timeout_ms: default_dialog_timeout(),
            new_window_timeout_ms: default_new_window_timeout(),
            success_timeout_ms: default_success_timeout(),
        }
    }
}

impl SiteConfig {
    /// CSS path to the control in row `row`, column `column` (both 1-based).
    pub fn control_path_for(&self, row: usize, column: usize) -> Option<Locator> {
        match &self.result_rows {
            Locator::Css(rows) => Some(Locator::css(format!(
                "{}:nth-child({}) > td:nth-child({}) {}",
                rows, row, column, self.control_path
            ))),
            _ => None,
        }
    }

    pub fn is_transient_login_message(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.transient_login_patterns
            .iter()
            .any(|p| !p.is_empty() && message.contains(&p.to_lowercase()))
    }
}

/// The configuration slice shared by every worker of a run.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub site: SiteConfig,
    pub layout: LayoutConfig,
    pub pacing: PacingConfig,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            site: config.site.clone(),
            layout: config.layout.clone(),
            pacing: config.pacing.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_site_config() {
        let site = SiteConfig::default();
        assert_eq!(site.login_id_field, Locator::id("srchDvNm01"));
        assert_eq!(site.query_button, Locator::xpath("//input[@value='조회하기']"));
        assert_eq!(site.reserve_keywords, vec!["예약하기".to_string()]);
        assert_eq!(site.dialog_timeout_ms, 1500);
    }

    #[test]
    fn test_control_path_for() {
        let site = SiteConfig::default();
        let path = site.control_path_for(3, 7).unwrap();
        assert_eq!(
            path,
            Locator::css(
                "#result-form > fieldset > div.tbl_wrap.th_thead > table > tbody > tr:nth-child(3) > td:nth-child(7) a"
            )
        );

        let xpath_rows = SiteConfig {
            result_rows: Locator::xpath("//tr"),
            ..Default::default()
        };
        assert!(xpath_rows.control_path_for(1, 1).is_none());
    }

    #[test]
    fn test_transient_login_message() {
        let site = SiteConfig::default();
        assert!(site.is_transient_login_message("잠시 후 다시 시도해 주십시오."));
        assert!(site.is_transient_login_message("Please TRY AGAIN later"));
        assert!(!site.is_transient_login_message("비밀번호가 일치하지 않습니다."));
    }

    #[test]
    fn test_deserialize_overrides() {
        let toml = r#"
            search_url = "http://localhost/search"
            reserve_success = [{ url_contains = "/confirm" }, { marker = { css = ".done" } }]
            [carrier_filter]
            fixed_position = { id = "srt-only" }
        "#;
        let site: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(site.search_url, "http://localhost/search");
        assert_eq!(
            site.reserve_success,
            vec![
                SuccessProbe::UrlContains("/confirm".into()),
                SuccessProbe::Marker(Locator::css(".done")),
            ]
        );
        assert_eq!(site.waitlist_success, default_success_probes());
        assert_eq!(site.carrier_filter.fixed_position, Some(Locator::id("srt-only")));
        assert_eq!(site.carrier_filter.scan_attributes.len(), 4);
    }
}
