//! Typed construction of report requests.
//!
//! A [`ReportSpec`] is built once per fetch and lowered into the wire body
//! with [`ReportSpec::to_request`]. Building never fails: parameters the
//! remote service rejects (an inverted custom range, an unknown field) come
//! back as a bad-request status.

use api_types::{
    YesNo,
    report::{
        DateRangeType, Filter, FilterField, Format, ReportParams, ReportRequest, ReportType,
        SelectionCriteria,
    },
};
use chrono::NaiveDate;

/// Column holding the spend amount. It must stay first so that the TSV
/// payload carries it in the first cell.
pub const COST_FIELD: &str = "Cost";

pub const ACCOUNT_PERFORMANCE_NAME: &str = "ACCOUNT_PERFORMANCE";
pub const FILTERED_SPEND_NAME: &str = "FILTERED_SPEND";

/// Reporting period, either a keyword understood by the service or an
/// explicit inclusive range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DateRange {
    Today,
    Yesterday,
    #[default]
    Last3Days,
    Last5Days,
    Last7Days,
    Last14Days,
    Last30Days,
    Last90Days,
    Last365Days,
    ThisWeekMonToday,
    ThisMonth,
    LastWeek,
    LastMonth,
    AllTime,
    Custom { from: NaiveDate, to: NaiveDate },
}

impl DateRange {
    fn lower(self) -> (DateRangeType, SelectionCriteria) {
        let keyword = match self {
            Self::Today => DateRangeType::Today,
            Self::Yesterday => DateRangeType::Yesterday,
            Self::Last3Days => DateRangeType::Last3Days,
            Self::Last5Days => DateRangeType::Last5Days,
            Self::Last7Days => DateRangeType::Last7Days,
            Self::Last14Days => DateRangeType::Last14Days,
            Self::Last30Days => DateRangeType::Last30Days,
            Self::Last90Days => DateRangeType::Last90Days,
            Self::Last365Days => DateRangeType::Last365Days,
            Self::ThisWeekMonToday => DateRangeType::ThisWeekMonToday,
            Self::ThisMonth => DateRangeType::ThisMonth,
            Self::LastWeek => DateRangeType::LastWeek,
            Self::LastMonth => DateRangeType::LastMonth,
            Self::AllTime => DateRangeType::AllTime,
            Self::Custom { from, to } => {
                return (
                    DateRangeType::CustomDate,
                    SelectionCriteria {
                        date_from: Some(from),
                        date_to: Some(to),
                    },
                );
            }
        };
        (keyword, SelectionCriteria::default())
    }
}

impl std::str::FromStr for DateRange {
    type Err = String;

    /// Parses the service keyword (`LAST_MONTH`) or `YYYY-MM-DD..YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let range = match s.trim().to_ascii_uppercase().as_str() {
            "TODAY" => Self::Today,
            "YESTERDAY" => Self::Yesterday,
            "LAST_3_DAYS" => Self::Last3Days,
            "LAST_5_DAYS" => Self::Last5Days,
            "LAST_7_DAYS" => Self::Last7Days,
            "LAST_14_DAYS" => Self::Last14Days,
            "LAST_30_DAYS" => Self::Last30Days,
            "LAST_90_DAYS" => Self::Last90Days,
            "LAST_365_DAYS" => Self::Last365Days,
            "THIS_WEEK_MON_TODAY" => Self::ThisWeekMonToday,
            "THIS_MONTH" => Self::ThisMonth,
            "LAST_WEEK" => Self::LastWeek,
            "LAST_MONTH" => Self::LastMonth,
            "ALL_TIME" => Self::AllTime,
            other => {
                let (from, to) = other
                    .split_once("..")
                    .ok_or_else(|| format!("unknown date range: {s}"))?;
                let parse = |d: &str| {
                    NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                        .map_err(|err| format!("invalid date {d}: {err}"))
                };
                Self::Custom {
                    from: parse(from)?,
                    to: parse(to)?,
                }
            }
        };
        Ok(range)
    }
}

/// Immutable description of one report request.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportSpec {
    fields: Vec<String>,
    name: String,
    report_type: ReportType,
    range: DateRange,
    filters: Vec<Filter>,
    include_vat: bool,
    include_discount: bool,
}

impl ReportSpec {
    /// Return a builder for `ReportSpec`.
    pub fn builder() -> ReportSpecBuilder {
        ReportSpecBuilder::default()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Same spec over a different period.
    pub fn with_range(&self, range: DateRange) -> Self {
        Self {
            range,
            ..self.clone()
        }
    }

    /// Wire body of the request. Always TSV.
    pub fn to_request(&self) -> ReportRequest {
        let (date_range_type, selection_criteria) = self.range.lower();
        ReportRequest {
            params: ReportParams {
                selection_criteria,
                field_names: self.fields.clone(),
                report_name: self.name.clone(),
                report_type: self.report_type,
                date_range_type,
                format: Format::Tsv,
                include_vat: YesNo::from(self.include_vat),
                include_discount: YesNo::from(self.include_discount),
                filter: self.filters.clone(),
            },
        }
    }
}

#[derive(Debug)]
pub struct ReportSpecBuilder {
    fields: Vec<String>,
    name: Option<String>,
    report_type: Option<ReportType>,
    range: DateRange,
    filters: Vec<Filter>,
    include_vat: bool,
    include_discount: bool,
}

impl Default for ReportSpecBuilder {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            name: None,
            report_type: None,
            range: DateRange::default(),
            filters: Vec::new(),
            include_vat: true,
            include_discount: false,
        }
    }
}

impl ReportSpecBuilder {
    /// Adds a field; fields already present are ignored.
    pub fn field(mut self, field: impl Into<String>) -> ReportSpecBuilder {
        let field = field.into();
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
        self
    }

    pub fn fields<I, S>(self, fields: I) -> ReportSpecBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fields.into_iter().fold(self, |builder, f| builder.field(f))
    }

    pub fn name(mut self, name: impl Into<String>) -> ReportSpecBuilder {
        self.name = Some(name.into());
        self
    }

    pub fn report_type(mut self, report_type: ReportType) -> ReportSpecBuilder {
        self.report_type = Some(report_type);
        self
    }

    pub fn range(mut self, range: DateRange) -> ReportSpecBuilder {
        self.range = range;
        self
    }

    pub fn filter(mut self, filter: Filter) -> ReportSpecBuilder {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> ReportSpecBuilder {
        self.filters.extend(filters);
        self
    }

    pub fn include_vat(mut self, include: bool) -> ReportSpecBuilder {
        self.include_vat = include;
        self
    }

    pub fn include_discount(mut self, include: bool) -> ReportSpecBuilder {
        self.include_discount = include;
        self
    }

    /// Missing pieces fall back to a `Cost` column, a name derived from the
    /// filters and `CUSTOM_REPORT`.
    pub fn build(self) -> ReportSpec {
        let fields = if self.fields.is_empty() {
            vec![COST_FIELD.to_string()]
        } else {
            self.fields
        };
        let name = self.name.unwrap_or_else(|| {
            if self.filters.is_empty() {
                ACCOUNT_PERFORMANCE_NAME.to_string()
            } else {
                FILTERED_SPEND_NAME.to_string()
            }
        });
        ReportSpec {
            fields,
            name,
            report_type: self.report_type.unwrap_or(ReportType::CustomReport),
            range: self.range,
            filters: self.filters,
            include_vat: self.include_vat,
            include_discount: self.include_discount,
        }
    }
}

/// Builds a spec in one call.
pub fn build<I, S>(fields: I, name: &str, range: DateRange, filters: Vec<Filter>) -> ReportSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ReportSpec::builder()
        .fields(fields)
        .name(name)
        .range(range)
        .filters(filters)
        .build()
}

/// Ad network category of a spend row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdNetworkType {
    Search,
    AdNetwork,
}

impl AdNetworkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "SEARCH",
            Self::AdNetwork => "AD_NETWORK",
        }
    }
}

/// A spend query: the `Cost` of an account, optionally narrowed by ad
/// network type and locations of presence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpendQuery {
    pub ad_network_type: Option<AdNetworkType>,
    pub location_ids: Vec<u32>,
}

impl SpendQuery {
    pub fn total() -> Self {
        Self::default()
    }

    pub fn network(ad_network_type: AdNetworkType) -> Self {
        Self {
            ad_network_type: Some(ad_network_type),
            location_ids: Vec::new(),
        }
    }

    pub fn in_locations(mut self, location_ids: impl IntoIterator<Item = u32>) -> Self {
        self.location_ids = location_ids.into_iter().collect();
        self
    }

    pub fn is_filtered(&self) -> bool {
        self.ad_network_type.is_some() || !self.location_ids.is_empty()
    }

    /// Unfiltered queries use the account performance report; filtered
    /// ones need a custom report.
    pub fn to_spec(&self, range: DateRange) -> ReportSpec {
        let builder = ReportSpec::builder().field(COST_FIELD).range(range);
        if !self.is_filtered() {
            return builder
                .name(ACCOUNT_PERFORMANCE_NAME)
                .report_type(ReportType::AccountPerformanceReport)
                .build();
        }

        let mut builder = builder
            .name(FILTERED_SPEND_NAME)
            .report_type(ReportType::CustomReport);
        if let Some(network) = self.ad_network_type {
            builder = builder.filter(Filter::equals(
                FilterField::AdNetworkType,
                [network.as_str()],
            ));
        }
        if !self.location_ids.is_empty() {
            builder = builder.filter(Filter::equals(
                FilterField::LocationOfPresenceId,
                &self.location_ids,
            ));
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use api_types::report::FilterOperator;

    use super::*;

    #[test]
    fn build_without_filters_is_unfiltered() {
        let spec = build(["Cost"], "SPEND", DateRange::LastMonth, Vec::new());
        let request = spec.to_request();
        assert_eq!(request.params.field_names, vec!["Cost"]);
        assert_eq!(request.params.report_name, "SPEND");
        assert_eq!(request.params.date_range_type, DateRangeType::LastMonth);
        assert!(request.params.filter.is_empty());
        assert_eq!(request.params.include_vat, YesNo::Yes);
        assert_eq!(request.params.include_discount, YesNo::No);
    }

    #[test]
    fn duplicate_fields_keep_first_position() {
        let spec = ReportSpec::builder()
            .fields(["Cost", "Clicks", "Cost"])
            .build();
        assert_eq!(spec.fields(), ["Cost", "Clicks"]);
    }

    #[test]
    fn empty_builder_defaults_to_cost() {
        let spec = ReportSpec::builder().build();
        assert_eq!(spec.fields(), [COST_FIELD]);
        assert_eq!(spec.name(), ACCOUNT_PERFORMANCE_NAME);
        assert_eq!(spec.range(), DateRange::Last3Days);
    }

    #[test]
    fn custom_range_lowers_to_selection_criteria() {
        let from = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let spec = ReportSpec::builder()
            .range(DateRange::Custom { from, to })
            .build();
        let params = spec.to_request().params;
        assert_eq!(params.date_range_type, DateRangeType::CustomDate);
        assert_eq!(params.selection_criteria.date_from, Some(from));
        assert_eq!(params.selection_criteria.date_to, Some(to));
    }

    #[test]
    fn total_query_uses_account_performance_report() {
        let spec = SpendQuery::total().to_spec(DateRange::LastMonth);
        assert_eq!(spec.report_type(), ReportType::AccountPerformanceReport);
        assert_eq!(spec.name(), ACCOUNT_PERFORMANCE_NAME);
        assert!(spec.filters().is_empty());
    }

    #[test]
    fn network_outside_region_query_has_two_filters() {
        let spec = SpendQuery::network(AdNetworkType::AdNetwork)
            .in_locations([166, 111])
            .to_spec(DateRange::LastMonth);
        assert_eq!(spec.report_type(), ReportType::CustomReport);
        assert_eq!(spec.name(), FILTERED_SPEND_NAME);
        assert_eq!(
            spec.filters(),
            [
                Filter {
                    field: FilterField::AdNetworkType,
                    operator: FilterOperator::Equals,
                    values: vec!["AD_NETWORK".to_string()],
                },
                Filter {
                    field: FilterField::LocationOfPresenceId,
                    operator: FilterOperator::Equals,
                    values: vec!["166".to_string(), "111".to_string()],
                },
            ]
        );
    }

    #[test]
    fn campaign_report_with_in_filter_serializes() {
        let spec = ReportSpec::builder()
            .fields(["CampaignId", "Cost"])
            .report_type(ReportType::CampaignPerformanceReport)
            .filter(Filter::is_in(FilterField::CampaignId, [101, 202]))
            .build();
        let body = serde_json::to_value(spec.to_request()).unwrap();
        assert_eq!(body["params"]["ReportType"], "CAMPAIGN_PERFORMANCE_REPORT");
        assert_eq!(
            body["params"]["Filter"],
            serde_json::json!([
                {"Field": "CampaignId", "Operator": "IN", "Values": ["101", "202"]}
            ])
        );
    }

    #[test]
    fn with_range_keeps_everything_else() {
        let spec = SpendQuery::network(AdNetworkType::Search).to_spec(DateRange::Today);
        let moved = spec.with_range(DateRange::LastMonth);
        assert_eq!(moved.range(), DateRange::LastMonth);
        assert_eq!(moved.filters(), spec.filters());
        assert_eq!(moved.name(), spec.name());
        assert_eq!(
            moved.to_request().params.date_range_type,
            DateRangeType::LastMonth
        );
    }

    #[test]
    fn parses_keywords_and_custom_ranges() {
        assert_eq!("last_month".parse::<DateRange>(), Ok(DateRange::LastMonth));
        assert_eq!("LAST_3_DAYS".parse::<DateRange>(), Ok(DateRange::Last3Days));
        assert_eq!(
            "2025-01-01..2025-01-31".parse::<DateRange>(),
            Ok(DateRange::Custom {
                from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                to: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            })
        );
        assert!("NEXT_YEAR".parse::<DateRange>().is_err());
    }
}
