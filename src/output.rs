//! C9's persisted layout: the whitespace-separated chain file, its
//! evidence summary, the rolling-KS diagnostic CSV, and checkpoint
//! writing, following `nmodes::output::save_parameter_trajectory`'s use
//! of the `csv` crate for tabular output and `serde_json` for structured
//! blobs.

use std::fs;
use std::path::Path;

use chrono::Utc;
use log::info;

use crate::classical::NestedResult;
use crate::diagnostics::Recorder;
use crate::error::Result;
use crate::importance::ImportanceResult;
use crate::model::Model;
use crate::sample::Sample;

fn write_chain(path: &Path, model: &dyn Model, samples: &[Sample]) -> Result<()> {
    let mut out = String::new();
    out.push_str(&model.names().join(" "));
    out.push_str(" logP logL it\n");
    for s in samples {
        for &v in &s.x {
            out.push_str(&v.to_string());
            out.push(' ');
        }
        out.push_str(&format!("{} {} {}\n", s.log_p, s.log_l, s.it));
    }
    fs::write(path, out)?;
    Ok(())
}

fn write_evidence(path: &Path, log_z: f64, log_l_max: f64, information: f64) -> Result<()> {
    fs::write(path, format!("{log_z} {log_l_max} {information}\n"))?;
    Ok(())
}

pub fn save_classical_result(output_dir: &Path, model: &dyn Model, result: &NestedResult) -> Result<()> {
    info!("Saving classical run to {:?}", output_dir);
    fs::create_dir_all(output_dir)?;

    let chain_path = output_dir.join(format!("chain_{}.txt", result.nested_samples.len()));
    let mut all_samples = result.nested_samples.clone();
    all_samples.extend(result.live_points.iter().cloned());
    write_chain(&chain_path, model, &all_samples)?;

    let evidence_path = output_dir.join(format!("chain_{}.txt_evidence.txt", result.nested_samples.len()));
    let log_l_max = all_samples
        .iter()
        .map(|s| s.log_l)
        .fold(f64::NEG_INFINITY, f64::max);
    write_evidence(&evidence_path, result.log_z, log_l_max, result.information)?;

    let summary_path = output_dir.join("result.json");
    fs::write(
        summary_path,
        serde_json::to_string_pretty(&ResultSummary {
            log_z: result.log_z,
            log_z_error: result.log_z_error,
            information: result.information,
            iterations: result.iterations,
            likelihood_evaluations: result.likelihood_evaluations,
            final_ks_p: result.final_ks_p,
            finished_at: Utc::now().to_rfc3339(),
        })?,
    )?;

    Ok(())
}

pub fn save_importance_result(output_dir: &Path, model: &dyn Model, result: &ImportanceResult) -> Result<()> {
    info!("Saving importance run to {:?}", output_dir);
    fs::create_dir_all(output_dir)?;

    let chain_path = output_dir.join(format!("chain_{}.txt", result.samples.len()));
    write_chain(&chain_path, model, &result.samples)?;

    let evidence_path = output_dir.join(format!("chain_{}.txt_evidence.txt", result.samples.len()));
    let log_l_max = result
        .samples
        .iter()
        .map(|s| s.log_l)
        .fold(f64::NEG_INFINITY, f64::max);
    write_evidence(&evidence_path, result.log_z, log_l_max, 0.0)?;

    let summary_path = output_dir.join("result.json");
    fs::write(
        summary_path,
        serde_json::to_string_pretty(&ImportanceSummary {
            log_z: result.log_z,
            log_z_error: result.log_z_error,
            levels: result.levels,
            effective_sample_size: result.effective_sample_size,
            likelihood_evaluations: result.likelihood_evaluations,
            finished_at: Utc::now().to_rfc3339(),
        })?,
    )?;

    Ok(())
}

pub fn save_rolling_ks(output_dir: &Path, recorder: &Recorder) -> Result<()> {
    fs::create_dir_all(output_dir.join("diagnostics"))?;
    let path = output_dir.join("diagnostics").join("rolling_ks.csv");
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["window_index", "p_value"])?;
    for (i, &p) in recorder.rolling_ks_p.iter().enumerate() {
        wtr.write_record([i.to_string(), p.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(serde::Serialize)]
struct ResultSummary {
    log_z: f64,
    log_z_error: f64,
    information: f64,
    iterations: usize,
    likelihood_evaluations: u64,
    final_ks_p: Option<f64>,
    finished_at: String,
}

#[derive(serde::Serialize)]
struct ImportanceSummary {
    log_z: f64,
    log_z_error: f64,
    levels: usize,
    effective_sample_size: f64,
    likelihood_evaluations: u64,
    finished_at: String,
}
