use anyhow::{Context, Result};
use chrono::Local;
use console::style;
use csv::WriterBuilder;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::io::Write;

use crate::error::Failure;
use crate::types::*;

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
    Csv,
    Tsv,
}

impl ReportFormat {
    fn delimiter(&self) -> u8 {
        match self {
            ReportFormat::Tsv => b'\t',
            _ => b',',
        }
    }
}

/// Renders registry results to a writer (stdout in the CLI)
pub struct ReportWriter<W: Write> {
    out: W,
    format: ReportFormat,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W, format: ReportFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn write_availability(&mut self, report: &AvailabilityReport) -> Result<()> {
        match self.format {
            ReportFormat::Json => self.write_json(report),
            ReportFormat::Csv | ReportFormat::Tsv => {
                let mut wtr = WriterBuilder::new()
                    .delimiter(self.format.delimiter())
                    .from_writer(&mut self.out);

                wtr.write_record([
                    "id",
                    "name",
                    "age",
                    "gender",
                    "blood_type",
                    "hla_typing",
                    "infection_status",
                ])?;

                for donor in &report.donors {
                    wtr.write_record([
                        &donor.id.to_string(),
                        &donor.name,
                        &donor.age.to_string(),
                        &donor.gender,
                        &donor.blood_type,
                        &donor.hla_typing,
                        &donor.infection_status.to_string(),
                    ])?;
                }

                wtr.flush()?;
                Ok(())
            }
            ReportFormat::Table => {
                self.write_header(&format!("Donors with {} available", report.organ))?;

                for donor in &report.donors {
                    writeln!(
                        self.out,
                        "  {:>5}  {:<24} {:>3}  {:<6} {:<4} {:<12} {}",
                        donor.id,
                        donor.name,
                        donor.age,
                        donor.gender,
                        donor.blood_type,
                        donor.hla_typing,
                        if donor.infection_status {
                            style("infected").red().to_string()
                        } else {
                            style("clear").green().to_string()
                        }
                    )?;
                }

                writeln!(
                    self.out,
                    "\n  {} {}",
                    style("Total donors:").bold(),
                    report.total_donors
                )?;
                Ok(())
            }
        }
    }

    pub fn write_verdict(&mut self, donor_id: u64, organ: &str, verdict: &Verdict) -> Result<()> {
        match self.format {
            ReportFormat::Json => self.write_json(verdict),
            ReportFormat::Csv | ReportFormat::Tsv => {
                let mut wtr = WriterBuilder::new()
                    .delimiter(self.format.delimiter())
                    .from_writer(&mut self.out);

                wtr.write_record(["donor_id", "organ", "compatible", "reason"])?;
                wtr.write_record([
                    donor_id.to_string().as_str(),
                    organ,
                    verdict.compatible.to_string().as_str(),
                    verdict.reason.as_str(),
                ])?;

                wtr.flush()?;
                Ok(())
            }
            ReportFormat::Table => {
                let mark = if verdict.compatible {
                    style("✓ compatible").green().bold()
                } else {
                    style("✗ incompatible").red().bold()
                };
                writeln!(self.out, "Donor {} / {}: {}", donor_id, organ, mark)?;
                writeln!(self.out, "  {}", style(&verdict.reason).dim())?;
                Ok(())
            }
        }
    }

    pub fn write_screening(&mut self, report: &ScreeningReport) -> Result<()> {
        match self.format {
            ReportFormat::Json => self.write_json(report),
            ReportFormat::Csv | ReportFormat::Tsv => {
                let mut wtr = WriterBuilder::new()
                    .delimiter(self.format.delimiter())
                    .from_writer(&mut self.out);

                wtr.write_record(["donor_id", "donor_name", "compatible", "reason"])?;
                for entry in &report.results {
                    wtr.write_record([
                        &entry.donor_id.to_string(),
                        &entry.donor_name,
                        &entry.verdict.compatible.to_string(),
                        &entry.verdict.reason,
                    ])?;
                }

                wtr.flush()?;
                Ok(())
            }
            ReportFormat::Table => {
                self.write_header(&format!("Screening for {}", report.organ))?;

                for entry in &report.results {
                    let mark = if entry.verdict.compatible {
                        style("✓").green()
                    } else {
                        style("✗").red()
                    };
                    writeln!(
                        self.out,
                        "  {} {:>5}  {:<24} {}",
                        mark, entry.donor_id, entry.donor_name, entry.verdict.reason
                    )?;
                }

                writeln!(
                    self.out,
                    "\n  {} {} of {}",
                    style("Compatible:").bold(),
                    report.compatible_count,
                    report.screened
                )?;
                Ok(())
            }
        }
    }

    pub fn write_registration(&mut self, donor_id: u64) -> Result<()> {
        match self.format {
            ReportFormat::Json => self.write_json(&serde_json::json!({ "id": donor_id })),
            ReportFormat::Csv | ReportFormat::Tsv => {
                writeln!(self.out, "id\n{}", donor_id)?;
                Ok(())
            }
            ReportFormat::Table => {
                writeln!(
                    self.out,
                    "{} Registered donor {}",
                    style("✓").green().bold(),
                    style(donor_id).cyan()
                )?;
                Ok(())
            }
        }
    }

    /// Organ flag names with the size field each one is checked against
    pub fn write_organs(&mut self) -> Result<()> {
        let rows: Vec<(&str, Option<&str>)> = Organ::ALL
            .iter()
            .map(|organ| (organ.name(), organ.size_field().map(|f| f.field_name())))
            .collect();

        match self.format {
            ReportFormat::Json => {
                let body: Vec<serde_json::Value> = rows
                    .iter()
                    .map(|(organ, size)| serde_json::json!({ "organ": organ, "sizeField": size }))
                    .collect();
                self.write_json(&body)
            }
            ReportFormat::Csv | ReportFormat::Tsv => {
                let mut wtr = WriterBuilder::new()
                    .delimiter(self.format.delimiter())
                    .from_writer(&mut self.out);

                wtr.write_record(["organ", "size_field"])?;
                for (organ, size) in &rows {
                    wtr.write_record([*organ, size.unwrap_or("")])?;
                }

                wtr.flush()?;
                Ok(())
            }
            ReportFormat::Table => {
                writeln!(self.out, "{}\n", style("Registry organs:").bold().cyan())?;
                for (organ, size) in &rows {
                    writeln!(
                        self.out,
                        "  {:<10} {}",
                        style(organ).green().bold(),
                        style(size.unwrap_or("(no size check)")).yellow()
                    )?;
                }
                Ok(())
            }
        }
    }

    pub fn write_failure(&mut self, failure: &Failure) -> Result<()> {
        self.write_json(failure)
    }

    fn write_header(&mut self, title: &str) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        writeln!(self.out, "{}", style(title).bold().cyan())?;
        writeln!(self.out, "{}\n", style(format!("Generated on: {}", timestamp)).dim())?;
        Ok(())
    }

    fn write_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let body = to_string_pretty(value).context("Failed to serialize report")?;
        writeln!(self.out, "{}", body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> AvailabilityReport {
        AvailabilityReport {
            organ: Organ::Kidney,
            total_donors: 1,
            donors: vec![DonorSummary {
                id: 3,
                name: "Ada, Lovelace".to_string(),
                age: 36,
                gender: "F".to_string(),
                blood_type: "A+".to_string(),
                hla_typing: "B8".to_string(),
                infection_status: false,
            }],
        }
    }

    fn render(format: ReportFormat, f: impl FnOnce(&mut ReportWriter<Vec<u8>>) -> Result<()>) -> String {
        let mut writer = ReportWriter::new(Vec::new(), format);
        f(&mut writer).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_availability_json_uses_camel_case() {
        let out = render(ReportFormat::Json, |w| w.write_availability(&report()));
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["organ"], "kidney");
        assert_eq!(value["totalDonors"], 1);
        assert_eq!(value["donors"][0]["infectionStatus"], false);
    }

    #[test]
    fn test_availability_csv_quotes_fields() {
        let out = render(ReportFormat::Csv, |w| w.write_availability(&report()));
        let mut lines = out.lines();

        assert_eq!(
            lines.next(),
            Some("id,name,age,gender,blood_type,hla_typing,infection_status")
        );
        assert_eq!(lines.next(), Some("3,\"Ada, Lovelace\",36,F,A+,B8,false"));
    }

    #[test]
    fn test_verdict_tsv() {
        let verdict = Verdict::rejected(Rule::Infection, "Donor has infection");
        let out = render(ReportFormat::Tsv, |w| w.write_verdict(3, "kidney", &verdict));

        assert!(out.contains("donor_id\torgan\tcompatible\treason"));
        assert!(out.contains("3\tkidney\tfalse\tDonor has infection"));
    }

    #[test]
    fn test_verdict_json_has_only_contract_fields() {
        let verdict = Verdict::compatible(Organ::Liver);
        let out = render(ReportFormat::Json, |w| w.write_verdict(1, "liver", &verdict));
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["compatible"], true);
        assert_eq!(value["reason"], "Donor is compatible for liver");
        assert_eq!(value.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn test_table_lists_donors() {
        let out = render(ReportFormat::Table, |w| w.write_availability(&report()));
        assert!(out.contains("Ada, Lovelace"));
        assert!(out.contains("Total donors:"));
    }

    #[test]
    fn test_organs_follow_requested_format() {
        let json = render(ReportFormat::Json, |w| w.write_organs());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_array().map(|a| a.len()), Some(7));
        assert_eq!(value[0]["organ"], "cornea");
        assert!(value[0]["sizeField"].is_null());
        assert_eq!(value[4]["sizeField"], "single_lung_volume");

        let tsv = render(ReportFormat::Tsv, |w| w.write_organs());
        let mut lines = tsv.lines();
        assert_eq!(lines.next(), Some("organ\tsize_field"));
        assert!(tsv.contains("pancreas\tpancreas_size"));
    }
}
