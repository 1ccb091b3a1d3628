use clap::{Parser, Subcommand};
use clinic_core::config::config_from_lookup;
use clinic_core::history::sort_chronologically;
use clinic_core::{BloodPressure, Pulse, Quantity, Spo2, VitalsRecord, VitalsService};
use clinic_types::{CompositionUid, EhrId, TemplateId};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic vitals CLI for an openEHR repository")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register a new EHR
    CreateEhr,
    /// Save a vitals recording
    Record {
        /// EHR id of the patient
        ehr_id: String,
        /// Systolic pressure in mm[Hg] (needs --diastolic)
        #[arg(long, requires = "diastolic")]
        systolic: Option<f64>,
        /// Diastolic pressure in mm[Hg] (needs --systolic)
        #[arg(long, requires = "systolic")]
        diastolic: Option<f64>,
        /// Pulse rate in beats per minute
        #[arg(long)]
        pulse: Option<f64>,
        /// SpO₂ as a whole percentage
        #[arg(long)]
        spo2: Option<f64>,
        /// Body weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Start time (RFC 3339); now when omitted
        #[arg(long, value_parser = parse_start_time)]
        start_time: Option<String>,
        /// Template id (optional)
        #[arg(long)]
        template: Option<String>,
        /// Uid of a stored recording to replace instead of creating a new one
        #[arg(long)]
        replace: Option<String>,
    },
    /// List a patient's vitals history, oldest first
    List {
        /// EHR id of the patient
        ehr_id: String,
        /// Template id (optional)
        #[arg(long)]
        template: Option<String>,
        /// Print dashboard chart points instead of records
        #[arg(long)]
        chart: bool,
    },
    /// Show one recording
    Show {
        /// EHR id of the patient
        ehr_id: String,
        /// Composition uid
        uid: String,
        /// Print the stored flat composition
        #[arg(long)]
        flat: bool,
    },
    /// Delete one recording
    Delete {
        /// EHR id of the patient
        ehr_id: String,
        /// Composition uid
        uid: String,
    },
    /// List available templates
    Templates {
        /// Filter on name or id (optional)
        #[arg(long)]
        search: Option<String>,
    },
}

fn parse_start_time(raw: &str) -> Result<String, String> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|_| raw.to_string())
        .map_err(|e| format!("not an RFC 3339 timestamp: {e}"))
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    systolic: Option<f64>,
    diastolic: Option<f64>,
    pulse: Option<f64>,
    spo2: Option<f64>,
    weight: Option<f64>,
    height: Option<f64>,
    start_time: Option<String>,
    template: Option<String>,
) -> VitalsRecord {
    VitalsRecord {
        start_time,
        template_id: template,
        blood_pressure: systolic.zip(diastolic).map(|(s, d)| BloodPressure {
            systolic: Quantity::new(s, "mm[Hg]"),
            diastolic: Quantity::new(d, "mm[Hg]"),
        }),
        pulse: pulse.map(|rate| Pulse {
            rate,
            units: "/min".into(),
        }),
        spo2: spo2.map(|percent| Spo2 {
            numerator: percent,
            denominator: 100.0,
        }),
        body_weight: weight.map(|w| Quantity::new(w, "kg")),
        height: height.map(|h| Quantity::new(h, "cm")),
        ..Default::default()
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("clinic_core=warn".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'clinic --help' for commands");
        return Ok(());
    };

    let cfg = Arc::new(config_from_lookup(|name| std::env::var(name).ok())?);
    let service = VitalsService::new(cfg)?;

    match command {
        Commands::CreateEhr => {
            let summary = service.create_ehr().await?;
            println!("Created EHR: {}", summary.ehr_id);
        }
        Commands::Record {
            ehr_id,
            systolic,
            diastolic,
            pulse,
            spo2,
            weight,
            height,
            start_time,
            template,
            replace,
        } => {
            let ehr_id = EhrId::new(ehr_id)?;
            let record = build_record(
                systolic, diastolic, pulse, spo2, weight, height, start_time, template,
            );
            let uid = match replace {
                Some(uid) => service.update(&ehr_id, &CompositionUid::new(uid)?, &record).await?,
                None => service.create(&ehr_id, &record).await?,
            };
            println!("Saved vitals: {}", uid);
        }
        Commands::List {
            ehr_id,
            template,
            chart,
        } => {
            let ehr_id = EhrId::new(ehr_id)?;
            if chart {
                print_json(&service.chart(&ehr_id).await?)?;
            } else {
                let mut records = match template {
                    Some(t) => service.list_for_template(&ehr_id, &TemplateId::new(t)?).await?,
                    None => service.list(&ehr_id).await?,
                };
                if records.is_empty() {
                    println!("No vitals recorded.");
                } else {
                    sort_chronologically(&mut records);
                    print_json(&records)?;
                }
            }
        }
        Commands::Show { ehr_id, uid, flat } => {
            let ehr_id = EhrId::new(ehr_id)?;
            let uid = CompositionUid::new(uid)?;
            if flat {
                print_json(&service.get_flat(&ehr_id, &uid).await?)?;
            } else {
                print_json(&service.get_record(&ehr_id, &uid).await?)?;
            }
        }
        Commands::Delete { ehr_id, uid } => {
            let ehr_id = EhrId::new(ehr_id)?;
            let uid = CompositionUid::new(uid)?;
            service.delete(&ehr_id, &uid).await?;
            println!("Deleted vitals: {}", uid);
        }
        Commands::Templates { search } => {
            let term = search.unwrap_or_default();
            for template in service
                .list_templates()
                .await
                .into_iter()
                .filter(|t| t.matches(&term))
            {
                println!("{}  {}", template.template_id, template.name);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        let cli = Cli::try_parse_from(std::iter::once("clinic").chain(args.iter().copied()))
            .expect("parses");
        cli.command.expect("subcommand")
    }

    #[test]
    fn no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["clinic"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn create_ehr_takes_no_arguments() {
        assert!(matches!(parse(&["create-ehr"]), Commands::CreateEhr));
        assert!(Cli::try_parse_from(["clinic", "create-ehr", "extra"]).is_err());
    }

    #[test]
    fn record_parses_every_measurement() {
        let command = parse(&[
            "record",
            "abc-123",
            "--systolic",
            "120",
            "--diastolic",
            "80",
            "--pulse",
            "72",
            "--spo2",
            "97",
            "--weight",
            "70.5",
            "--height",
            "172",
            "--start-time",
            "2024-03-01T10:00:00Z",
            "--template",
            "ward.vitals.v1",
            "--replace",
            "8849182c-82ad-4088-a07f-48ead4180515::local.ehrbase.org::1",
        ]);
        let Commands::Record {
            ehr_id,
            systolic,
            diastolic,
            pulse,
            spo2,
            weight,
            height,
            start_time,
            template,
            replace,
        } = command
        else {
            panic!("expected the record subcommand");
        };
        assert_eq!(ehr_id, "abc-123");
        assert_eq!((systolic, diastolic), (Some(120.0), Some(80.0)));
        assert_eq!((pulse, spo2), (Some(72.0), Some(97.0)));
        assert_eq!((weight, height), (Some(70.5), Some(172.0)));
        assert_eq!(start_time.as_deref(), Some("2024-03-01T10:00:00Z"));
        assert_eq!(template.as_deref(), Some("ward.vitals.v1"));
        assert!(replace.is_some());
    }

    #[test]
    fn record_needs_both_pressures() {
        assert!(Cli::try_parse_from(["clinic", "record", "abc-123", "--systolic", "120"]).is_err());
        assert!(Cli::try_parse_from(["clinic", "record", "abc-123", "--diastolic", "80"]).is_err());
    }

    #[test]
    fn record_rejects_a_malformed_start_time() {
        let err = Cli::try_parse_from(["clinic", "record", "abc-123", "--pulse", "72", "--start-time", "yesterday"])
            .expect_err("bad time");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn list_parses_template_and_chart() {
        let command = parse(&["list", "abc-123", "--template", "vitals.v1", "--chart"]);
        assert!(matches!(
            command,
            Commands::List { ref ehr_id, template: Some(ref template), chart: true }
                if ehr_id == "abc-123" && template == "vitals.v1"
        ));
        assert!(matches!(parse(&["list", "abc-123"]), Commands::List { template: None, chart: false, .. }));
    }

    #[test]
    fn show_parses_uid_and_flat() {
        let command = parse(&["show", "abc-123", "some-uid", "--flat"]);
        assert!(matches!(
            command,
            Commands::Show { ref uid, flat: true, .. } if uid == "some-uid"
        ));
        assert!(Cli::try_parse_from(["clinic", "show", "abc-123"]).is_err());
    }

    #[test]
    fn delete_needs_ehr_and_uid() {
        let command = parse(&["delete", "abc-123", "some-uid"]);
        assert!(matches!(
            command,
            Commands::Delete { ref ehr_id, ref uid } if ehr_id == "abc-123" && uid == "some-uid"
        ));
        assert!(Cli::try_parse_from(["clinic", "delete", "abc-123"]).is_err());
    }

    #[test]
    fn templates_takes_an_optional_search() {
        assert!(matches!(parse(&["templates"]), Commands::Templates { search: None }));
        assert!(matches!(
            parse(&["templates", "--search", "vitals"]),
            Commands::Templates { search: Some(ref term) } if term == "vitals"
        ));
    }

    #[test]
    fn build_record_pairs_blood_pressure() {
        let record = build_record(Some(120.0), Some(80.0), Some(72.0), Some(97.0), None, None, None, None);
        let bp = record.blood_pressure.expect("blood pressure");
        assert_eq!(bp.systolic, Quantity::new(120.0, "mm[Hg]"));
        assert_eq!(bp.diastolic, Quantity::new(80.0, "mm[Hg]"));
        assert_eq!(record.pulse.map(|p| p.units), Some("/min".to_string()));
        assert_eq!(record.spo2.as_ref().and_then(Spo2::percentage), Some(97.0));
        assert!(record.body_weight.is_none());

        let record = build_record(Some(120.0), None, None, None, Some(70.5), None, None, None);
        assert!(record.blood_pressure.is_none());
        assert_eq!(record.body_weight, Some(Quantity::new(70.5, "kg")));
    }
}
