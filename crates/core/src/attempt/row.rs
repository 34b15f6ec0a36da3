//! Projection of live result rows into plain values.

use tracing::trace;

use crate::driver::{Driver, DriverError, ElementRef, Locator};
use crate::layout::{ColumnMap, ColumnRole};

use super::config::SiteConfig;
use super::types::SeatKind;

/// One seat cell of a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellView {
    pub text: String,
    /// Actionable control inside the cell, if any.
    pub control: Option<ElementRef>,
    /// Accessible labels of the control (attributes and image alt text).
    pub labels: Vec<String>,
    /// Whether the cell offers its action per the keyword set it was read with.
    pub offered: bool,
}

impl CellView {
    pub fn label(&self) -> &str {
        let text = self.text.trim();
        if !text.is_empty() {
            return text;
        }
        self.labels.first().map(String::as_str).unwrap_or_default()
    }
}

/// A result row, projected once per poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    /// 1-based position in the result table.
    pub position: usize,
    pub carrier: Option<String>,
    pub standard: Option<CellView>,
    pub premium: Option<CellView>,
    pub waitlist: Option<CellView>,
}

impl ResultRow {
    pub fn cell(&self, role: ColumnRole) -> Option<&CellView> {
        match role {
            ColumnRole::Standard => self.standard.as_ref(),
            ColumnRole::Premium => self.premium.as_ref(),
            ColumnRole::Waitlist => self.waitlist.as_ref(),
        }
    }

    pub fn has_standard_offer(&self) -> bool {
        self.offers(ColumnRole::Standard)
    }

    pub fn has_premium_offer(&self) -> bool {
        self.offers(ColumnRole::Premium)
    }

    pub fn has_waitlist_offer(&self) -> bool {
        self.offers(ColumnRole::Waitlist)
    }

    pub fn offers_seat(&self, seat: SeatKind) -> bool {
        self.offers(seat.role())
    }

    fn offers(&self, role: ColumnRole) -> bool {
        self.cell(role).is_some_and(|c| c.offered)
    }
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| !k.is_empty() && haystack.contains(k.as_str()))
}

/// Read one row. Element-scoped failures propagate so the caller can skip the row.
pub async fn project_row(
    driver: &dyn Driver,
    site: &SiteConfig,
    row: &ElementRef,
    position: usize,
    columns: &ColumnMap,
    with_carrier: bool,
) -> Result<ResultRow, DriverError> {
    let cells = driver.find_all_in(row, &site.cell).await?;

    let standard = read_cell(driver, site, &cells, columns.standard, &site.reserve_keywords).await?;
    let premium = read_cell(driver, site, &cells, columns.premium, &site.reserve_keywords).await?;
    let waitlist = read_cell(driver, site, &cells, columns.waitlist, &site.waitlist_keywords).await?;

    let carrier = if with_carrier {
        carrier_tag(driver, site, row, &cells).await?
    } else {
        None
    };

    Ok(ResultRow {
        position,
        carrier,
        standard,
        premium,
        waitlist,
    })
}

async fn read_cell(
    driver: &dyn Driver,
    site: &SiteConfig,
    cells: &[ElementRef],
    column: usize,
    keywords: &[String],
) -> Result<Option<CellView>, DriverError> {
    let Some(cell) = column.checked_sub(1).and_then(|i| cells.get(i)) else {
        return Ok(None);
    };

    let text = driver.text(cell).await?.trim().to_string();
    let control = driver.find_all_in(cell, &site.control).await?.into_iter().next();

    let mut labels = Vec::new();
    let mut offered = contains_any(&text, keywords);
    if !offered {
        if let Some(control) = &control {
            labels = control_labels(driver, site, control).await;
            offered = labels.iter().any(|l| contains_any(l, keywords));
        }
    }

    Ok(Some(CellView {
        text,
        control,
        labels,
        offered,
    }))
}

/// Attribute labels plus image alt text; lookup failures just yield fewer labels.
async fn control_labels(driver: &dyn Driver, site: &SiteConfig, control: &ElementRef) -> Vec<String> {
    let mut labels = Vec::new();
    for name in &site.label_attributes {
        match driver.attribute(control, name).await {
            Ok(Some(value)) if !value.trim().is_empty() => labels.push(value.trim().to_string()),
            Ok(_) => {}
            Err(e) => trace!(error = %e, attribute = %name, "label lookup failed"),
        }
    }
    if let Ok(images) = driver.find_all_in(control, &Locator::css("img")).await {
        for image in images {
            if let Ok(Some(alt)) = driver.attribute(&image, "alt").await {
                if !alt.trim().is_empty() {
                    labels.push(alt.trim().to_string());
                }
            }
        }
    }
    labels
}

/// Carrier name from the leading text cell, falling back to an image alt.
async fn carrier_tag(
    driver: &dyn Driver,
    site: &SiteConfig,
    row: &ElementRef,
    cells: &[ElementRef],
) -> Result<Option<String>, DriverError> {
    if let Some(cell) = site.carrier_column.checked_sub(1).and_then(|i| cells.get(i)) {
        let text = driver.text(cell).await?;
        let text = text.trim();
        if !text.is_empty() {
            return Ok(Some(text.to_string()));
        }
    }

    for image in driver.find_all_in(row, &Locator::css("img")).await? {
        if let Some(alt) = driver.attribute(&image, "alt").await? {
            if !alt.trim().is_empty() {
                return Ok(Some(alt.trim().to_string()));
            }
        }
    }

    Ok(None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    Inactive,
    Active,
    Degraded,
}

/// Row-level carrier filter.
///
/// Active only when a carrier was requested. Degrades permanently to
/// "accept everything" the first time a poll has rows but none match.
#[derive(Debug, Clone)]
pub struct CarrierFilter {
    carrier: Option<String>,
    state: FilterState,
}

impl CarrierFilter {
    pub fn new(carrier: Option<&str>) -> Self {
        let carrier = carrier
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_lowercase);
        let state = if carrier.is_some() {
            FilterState::Active
        } else {
            FilterState::Inactive
        };
        Self { carrier, state }
    }

    pub fn is_active(&self) -> bool {
        self.state == FilterState::Active
    }

    pub fn is_degraded(&self) -> bool {
        self.state == FilterState::Degraded
    }

    pub fn accepts(&self, row: &ResultRow) -> bool {
        match (&self.state, &self.carrier) {
            (FilterState::Active, Some(carrier)) => row
                .carrier
                .as_deref()
                .is_some_and(|tag| tag.to_lowercase().contains(carrier.as_str())),
            _ => true,
        }
    }

    /// Stop filtering. Returns `true` on the transition.
    pub fn degrade(&mut self) -> bool {
        if self.state == FilterState::Active {
            self.state = FilterState::Degraded;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(text: &str, offered: bool) -> CellView {
        CellView {
            text: text.to_string(),
            control: None,
            labels: Vec::new(),
            offered,
        }
    }

    fn row(carrier: Option<&str>) -> ResultRow {
        ResultRow {
            position: 1,
            carrier: carrier.map(String::from),
            standard: Some(cell("예약하기", true)),
            premium: Some(cell("매진", false)),
            waitlist: None,
        }
    }

    #[test]
    fn test_offer_flags() {
        let r = row(None);
        assert!(r.has_standard_offer());
        assert!(!r.has_premium_offer());
        assert!(!r.has_waitlist_offer());
        assert!(r.offers_seat(SeatKind::Standard));
    }

    #[test]
    fn test_cell_label_prefers_text() {
        let mut c = cell("", false);
        c.labels = vec!["예약하기".into()];
        assert_eq!(c.label(), "예약하기");
        assert_eq!(cell("매진", false).label(), "매진");
    }

    #[test]
    fn test_inactive_filter_accepts_everything() {
        let filter = CarrierFilter::new(None);
        assert!(!filter.is_active());
        assert!(filter.accepts(&row(Some("KTX"))));
        assert!(filter.accepts(&row(None)));
        assert!(!CarrierFilter::new(Some("  ")).is_active());
    }

    #[test]
    fn test_active_filter_matches_case_insensitively() {
        let filter = CarrierFilter::new(Some("srt"));
        assert!(filter.accepts(&row(Some("SRT"))));
        assert!(!filter.accepts(&row(Some("KTX"))));
        assert!(!filter.accepts(&row(None)));
    }

    #[test]
    fn test_degrade_is_one_way() {
        let mut filter = CarrierFilter::new(Some("SRT"));
        assert!(filter.degrade());
        assert!(filter.is_degraded());
        assert!(!filter.degrade());
        assert!(filter.accepts(&row(Some("KTX"))));
    }
}
