//! Sales, finance and analytics report downloads.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::{
    client::{Client, require_id},
    download::{DownloadRequest, DownloadResult},
    error::{AscError, Result},
    query::{encode_pairs, with_query},
    render::{Table, TableRows, opt_text},
};

pub const REPORT_ACCEPT: &str = "application/a-gzip";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalesReportParams {
    pub vendor_number: String,
    pub report_type: String,
    pub report_sub_type: String,
    pub frequency: String,
    pub report_date: String,
    pub version: Option<String>,
}

impl SalesReportParams {
    fn query(&self) -> Result<String> {
        let mut pairs = vec![
            ("filter[frequency]", required(&self.frequency, "frequency")?.to_ascii_uppercase()),
            ("filter[reportDate]", required(&self.report_date, "report date")?),
            (
                "filter[reportSubType]",
                required(&self.report_sub_type, "report sub-type")?.to_ascii_uppercase(),
            ),
            ("filter[reportType]", required(&self.report_type, "report type")?.to_ascii_uppercase()),
            ("filter[vendorNumber]", required(&self.vendor_number, "vendor number")?),
        ];
        if let Some(version) = self.version.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            pairs.push(("filter[version]", version.to_string()));
        }
        Ok(encode_pairs(pairs))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinanceReportParams {
    pub vendor_number: String,
    pub report_type: String,
    pub region_code: String,
    pub report_date: String,
}

impl FinanceReportParams {
    fn query(&self) -> Result<String> {
        let pairs = [
            ("filter[regionCode]", required(&self.region_code, "region code")?.to_ascii_uppercase()),
            ("filter[reportDate]", required(&self.report_date, "report date")?),
            ("filter[reportType]", required(&self.report_type, "report type")?.to_ascii_uppercase()),
            ("filter[vendorNumber]", required(&self.vendor_number, "vendor number")?),
        ];
        Ok(encode_pairs(pairs))
    }
}

fn required(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AscError::InvalidArgument(format!("{what} is required")));
    }
    Ok(value.to_string())
}

/// Downloaded report file plus the parameters that selected it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportDownload {
    pub report: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_date: Option<String>,
    #[serde(flatten)]
    pub file: DownloadResult,
}

impl Client {
    /// Downloads a gzip sales report to `destination`, decompressing beside it
    /// when `decompress` is set.
    pub async fn download_sales_report(
        &self,
        params: &SalesReportParams,
        destination: impl Into<PathBuf>,
        decompress: bool,
    ) -> Result<ReportDownload> {
        let path = with_query("/v1/salesReports", &params.query()?);
        let request = DownloadRequest::new(path, destination)
            .accept(REPORT_ACCEPT)
            .decompress(decompress);
        let file = self.download(&request).await?;
        info!(report = "sales", bytes = file.bytes, "report downloaded");
        Ok(ReportDownload {
            report: "sales".into(),
            report_type: Some(params.report_type.trim().to_ascii_uppercase()),
            report_date: Some(params.report_date.trim().to_string()),
            file,
        })
    }

    pub async fn download_finance_report(
        &self,
        params: &FinanceReportParams,
        destination: impl Into<PathBuf>,
        decompress: bool,
    ) -> Result<ReportDownload> {
        let path = with_query("/v1/financeReports", &params.query()?);
        let request = DownloadRequest::new(path, destination)
            .accept(REPORT_ACCEPT)
            .decompress(decompress);
        let file = self.download(&request).await?;
        info!(report = "finance", bytes = file.bytes, "report downloaded");
        Ok(ReportDownload {
            report: "finance".into(),
            report_type: Some(params.report_type.trim().to_ascii_uppercase()),
            report_date: Some(params.report_date.trim().to_string()),
            file,
        })
    }

    /// Fetches an analytics report segment. Segment URLs are pre-signed storage
    /// links, so no bearer token is attached.
    pub async fn download_analytics_segment(
        &self,
        segment_url: &str,
        destination: impl Into<PathBuf>,
        decompress: bool,
    ) -> Result<ReportDownload> {
        let url = require_id(segment_url, "segment URL")?;
        let request = DownloadRequest::new(url, destination)
            .pre_signed()
            .decompress(decompress);
        let file = self.download(&request).await?;
        Ok(ReportDownload {
            report: "analytics".into(),
            report_type: None,
            report_date: None,
            file,
        })
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
}

impl TableRows for DownloadResult {
    fn table(&self) -> Table {
        Table::new(["File", "Size", "Decompressed File", "Decompressed Size"]).with_row([
            self.path.display().to_string(),
            self.bytes.to_string(),
            display_path(&self.decompressed_path),
            opt_text(&self.decompressed_bytes),
        ])
    }
}

impl TableRows for ReportDownload {
    fn table(&self) -> Table {
        Table::new([
            "Report",
            "Type",
            "Date",
            "File",
            "Size",
            "Decompressed File",
            "Decompressed Size",
        ])
        .with_row([
            self.report.clone(),
            opt_text(&self.report_type),
            opt_text(&self.report_date),
            self.file.path.display().to_string(),
            self.file.bytes.to_string(),
            display_path(&self.file.decompressed_path),
            opt_text(&self.file.decompressed_bytes),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sales_query_is_sorted_and_uppercased() {
        let params = SalesReportParams {
            vendor_number: "8500".into(),
            report_type: "sales".into(),
            report_sub_type: "summary".into(),
            frequency: "daily".into(),
            report_date: "2024-01-20".into(),
            version: Some("1_0".into()),
        };
        assert_eq!(
            params.query().unwrap(),
            "filter%5Bfrequency%5D=DAILY&filter%5BreportDate%5D=2024-01-20\
             &filter%5BreportSubType%5D=SUMMARY&filter%5BreportType%5D=SALES\
             &filter%5BvendorNumber%5D=8500&filter%5Bversion%5D=1_0"
        );
    }

    #[test]
    fn missing_vendor_is_rejected() {
        let params = FinanceReportParams {
            report_type: "FINANCIAL".into(),
            region_code: "US".into(),
            report_date: "2024-01".into(),
            ..Default::default()
        };
        assert!(matches!(params.query(), Err(AscError::InvalidArgument(_))));
    }
}
