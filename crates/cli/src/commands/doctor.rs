use std::path::Path;

use handl_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{escape_json, CommandResult, EXIT_CHECKS_FAILED};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 3] = ["llm_credentials", "telephony_readiness", "directory_readiness"];

pub fn run(config_path: Option<&Path>, json_output: bool) -> CommandResult {
    let options =
        LoadOptions { config_path: config_path.map(Path::to_path_buf), ..LoadOptions::default() };
    let report = build_report(AppConfig::load(options).map_err(|error| error.to_string()));
    let exit_code = if report.overall_status == CheckStatus::Fail { EXIT_CHECKS_FAILED } else { 0 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::text(exit_code, output);
    }

    CommandResult::text(exit_code, render_human(&report))
}

/// Skipped checks never fail the report; only an explicit failure does.
pub fn build_report(config: Result<AppConfig, String>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credentials(&config));
            checks.push(check_telephony(&config));
            checks.push(check_directory(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error,
            });
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let failed = checks.iter().filter(|check| check.status == CheckStatus::Fail).count();
    let (overall_status, summary) = if failed == 0 {
        (CheckStatus::Pass, "doctor: ready to place calls".to_string())
    } else {
        (CheckStatus::Fail, format!("doctor: {failed} readiness check(s) failed"))
    };

    DoctorReport { overall_status, summary, checks }
}

fn has_secret(secret: Option<&SecretString>) -> bool {
    secret.is_some_and(|value| !value.expose_secret().trim().is_empty())
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let provider = config.llm.provider.as_str();
    let endpoint = config.llm.effective_base_url().unwrap_or_else(|| "<unset>".to_string());

    let (status, details) = if !config.llm.provider.requires_api_key() {
        (CheckStatus::Pass, format!("{provider} needs no api key; model `{}` at {endpoint}", config.llm.model))
    } else if has_secret(config.llm.api_key.as_ref()) {
        (CheckStatus::Pass, format!("{provider} api key present; model `{}` at {endpoint}", config.llm.model))
    } else {
        (CheckStatus::Fail, format!("{provider} api key is missing (set HANDL_LLM_API_KEY)"))
    };

    DoctorCheck { name: "llm_credentials", status, details }
}

fn check_telephony(config: &AppConfig) -> DoctorCheck {
    let (status, details) = if !has_secret(config.telephony.api_key.as_ref()) {
        (
            CheckStatus::Fail,
            "telephony api key is missing; calls cannot be placed (set HANDL_TELEPHONY_API_KEY)"
                .to_string(),
        )
    } else {
        (
            CheckStatus::Pass,
            format!(
                "calls placed from `{}` via {}",
                config.telephony.phone_number_id, config.telephony.base_url
            ),
        )
    };

    DoctorCheck { name: "telephony_readiness", status, details }
}

fn check_directory(config: &AppConfig) -> DoctorCheck {
    let (status, details) = if has_secret(config.directory.api_key.as_ref()) {
        (
            CheckStatus::Pass,
            format!("business search enabled, up to {} results", config.directory.default_limit),
        )
    } else {
        (
            CheckStatus::Skipped,
            "directory api key is not set; only manually entered numbers can be called".to_string(),
        )
    };

    DoctorCheck { name: "directory_readiness", status, details }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
