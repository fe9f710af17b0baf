use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::config::ResolvedConfig;
use crate::diagnostics::Diagnostics;
use crate::diff::{DeltaOptions, DeltaReport, report_row_deltas};
use crate::overrides::Overrides;
use crate::record::Table;
use crate::stage2::{self, StageOutput};
use crate::stage3;
use crate::table::{read_table, read_table_if_exists, write_table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Summary of one stage written to disk.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub label: &'static str,
    pub input: PathBuf,
    pub output: PathBuf,
    pub rows_in: usize,
    pub rows_out: usize,
    pub sha256: String,
    pub delta: DeltaReport,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub verbose: bool,
}

pub fn run_stage2(
    paths: &StagePaths,
    overrides_path: &Path,
    config: &ResolvedConfig,
    options: RunOptions,
) -> Result<StageReport> {
    let input = read_table(&paths.input)?;
    let overrides = Overrides::load(overrides_path)?;
    let output = transform_stage2(&input, &paths.input, &overrides, config)?;
    finish(
        "Stage 2",
        paths,
        input.rows.len(),
        output,
        &stage2::KEY_FIELDS,
        config,
        options,
    )
}

pub fn run_stage3(
    paths: &StagePaths,
    config: &ResolvedConfig,
    options: RunOptions,
) -> Result<StageReport> {
    let input = read_table(&paths.input)?;
    let output = with_input(stage3::transform(&input, &config.format), &paths.input)?;
    finish(
        "Stage 3",
        paths,
        input.rows.len(),
        output,
        &stage3::KEY_FIELDS,
        config,
        options,
    )
}

/// Runs both stages, feeding the stage-2 table to stage 3 in memory.
pub fn run_all(
    stage2_paths: &StagePaths,
    stage3_output: &Path,
    overrides_path: &Path,
    config: &ResolvedConfig,
    options: RunOptions,
) -> Result<(StageReport, StageReport)> {
    let input = read_table(&stage2_paths.input)?;
    let overrides = Overrides::load(overrides_path)?;
    let stage2_output = transform_stage2(&input, &stage2_paths.input, &overrides, config)?;
    let stage3_table = with_input(
        stage3::transform(&stage2_output.table, &config.format),
        &stage2_paths.output,
    )?;
    let stage3_rows_in = stage2_output.table.rows.len();

    let first = finish(
        "Stage 2",
        stage2_paths,
        input.rows.len(),
        stage2_output,
        &stage2::KEY_FIELDS,
        config,
        options,
    )?;
    let stage3_paths = StagePaths {
        input: stage2_paths.output.clone(),
        output: stage3_output.to_path_buf(),
    };
    let second = finish(
        "Stage 3",
        &stage3_paths,
        stage3_rows_in,
        stage3_table,
        &stage3::KEY_FIELDS,
        config,
        options,
    )?;
    Ok((first, second))
}

fn transform_stage2(
    input: &Table,
    source: &Path,
    overrides: &Overrides,
    config: &ResolvedConfig,
) -> Result<StageOutput> {
    with_input(stage2::transform(input, overrides, &config.format), source)
}

/// Appends the offending input to a transform error:
/// `missing required column 'Phys MV' in <path>`.
fn with_input<T>(result: Result<T>, source: &Path) -> Result<T> {
    result.map_err(|error| anyhow!("{error} in {}", source.display()))
}

fn finish(
    label: &'static str,
    paths: &StagePaths,
    rows_in: usize,
    output: StageOutput,
    key_fields: &[&str],
    config: &ResolvedConfig,
    options: RunOptions,
) -> Result<StageReport> {
    let previous = read_table_if_exists(&paths.output)?;
    let present_keys = key_fields
        .iter()
        .copied()
        .filter(|field| output.table.has_column(field))
        .collect::<Vec<_>>();
    let delta = report_row_deltas(
        previous.as_ref(),
        &output.table,
        &present_keys,
        &DeltaOptions {
            label: label.to_string(),
            max_list: config.max_delta_list,
            align_columns: true,
            verbose: options.verbose,
        },
    );
    let sha256 = write_table(&paths.output, &output.table)?;
    tracing::info!(
        stage = label,
        rows_in,
        rows_out = output.table.rows.len(),
        warnings = output.diagnostics.total(),
        output = %paths.output.display(),
        "stage written"
    );

    Ok(StageReport {
        label,
        input: paths.input.clone(),
        output: paths.output.clone(),
        rows_in,
        rows_out: output.table.rows.len(),
        sha256,
        delta,
        diagnostics: output.diagnostics,
    })
}
