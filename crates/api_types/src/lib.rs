use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum YesNo {
    #[default]
    Yes,
    No,
}

impl From<bool> for YesNo {
    fn from(value: bool) -> Self {
        if value { Self::Yes } else { Self::No }
    }
}

pub mod report {
    use super::*;

    /// Body of a `POST /json/v5/reports` call.
    ///
    /// The service identifies an offline report by the whole body, so the
    /// exact same value must be re-sent while polling.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct ReportRequest {
        pub params: ReportParams,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ReportParams {
        pub selection_criteria: SelectionCriteria,
        pub field_names: Vec<String>,
        pub report_name: String,
        pub report_type: ReportType,
        pub date_range_type: DateRangeType,
        pub format: Format,
        #[serde(rename = "IncludeVAT")]
        pub include_vat: YesNo,
        pub include_discount: YesNo,
        /// Filters combine with an implicit AND. Omitted when empty.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub filter: Vec<Filter>,
    }

    /// Only carries dates for [`DateRangeType::CustomDate`]; serialized as
    /// `{}` otherwise.
    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SelectionCriteria {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub date_from: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub date_to: Option<NaiveDate>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum ReportType {
        AccountPerformanceReport,
        CampaignPerformanceReport,
        CustomReport,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum DateRangeType {
        Today,
        Yesterday,
        #[serde(rename = "LAST_3_DAYS")]
        Last3Days,
        #[serde(rename = "LAST_5_DAYS")]
        Last5Days,
        #[serde(rename = "LAST_7_DAYS")]
        Last7Days,
        #[serde(rename = "LAST_14_DAYS")]
        Last14Days,
        #[serde(rename = "LAST_30_DAYS")]
        Last30Days,
        #[serde(rename = "LAST_90_DAYS")]
        Last90Days,
        #[serde(rename = "LAST_365_DAYS")]
        Last365Days,
        ThisWeekMonToday,
        ThisMonth,
        LastWeek,
        LastMonth,
        AllTime,
        CustomDate,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum Format {
        #[default]
        Tsv,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct Filter {
        pub field: FilterField,
        pub operator: FilterOperator,
        pub values: Vec<String>,
    }

    impl Filter {
        pub fn equals<I, V>(field: FilterField, values: I) -> Self
        where
            I: IntoIterator<Item = V>,
            V: ToString,
        {
            Self {
                field,
                operator: FilterOperator::Equals,
                values: values.into_iter().map(|v| v.to_string()).collect(),
            }
        }

        pub fn is_in<I, V>(field: FilterField, values: I) -> Self
        where
            I: IntoIterator<Item = V>,
            V: ToString,
        {
            Self {
                operator: FilterOperator::In,
                ..Self::equals(field, values)
            }
        }
    }

    /// Report columns that can be filtered on.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub enum FilterField {
        AdNetworkType,
        LocationOfPresenceId,
        CampaignId,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum FilterOperator {
        Equals,
        In,
    }

    /// JSON diagnostic returned with every non-200 status.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct ErrorResponse {
        pub error: ErrorDetail,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ErrorDetail {
        #[serde(default)]
        pub request_id: Option<String>,
        #[serde(default)]
        pub error_code: Option<String>,
        #[serde(default)]
        pub error_string: Option<String>,
        #[serde(default)]
        pub error_detail: Option<String>,
    }
}
