//! Subcommand runners

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;

use super::args::{PredictArgs, ServeArgs, TrainArgs};
use crate::lineage::{DvcFileHash, FsTracking, RunState, TrainingRun};
use crate::report::display_run_summary;
use crate::serving::{load_pipeline, run_batch_inference, serve};
use crate::utils::{
    create_spinner, finish_with_failure, finish_with_success, print_banner, print_completion,
    print_info, print_step_header, print_step_time, print_success, print_train_config,
};

/// Step title shown when a run reaches `state`
fn stage_title(state: RunState) -> &'static str {
    match state {
        RunState::DataLogged => "Load & Log Dataset",
        RunState::SplitDone => "Train/Test Split",
        RunState::TransformsFit => "Fit Transforms",
        RunState::ModelTrained => "Train Gradient Boosting Model",
        RunState::Evaluated => "Evaluate",
        RunState::ArtifactLogged => "Log Artifacts",
        RunState::Registered => "Register Model Version",
        RunState::AliasPromoted => "Promote Alias",
        RunState::Started | RunState::Completed | RunState::Failed => "",
    }
}

pub fn run_train(args: &TrainArgs, tracking_root: &Path) -> Result<()> {
    let config = args.to_config();
    config.validate().context("Invalid training configuration")?;

    print_banner(env!("CARGO_PKG_VERSION"));
    print_train_config(
        &config.data_path,
        tracking_root,
        &config.experiment,
        &config.model_name,
        &config.alias,
    );

    let store = FsTracking::new(tracking_root);
    let hasher = DvcFileHash::new(&config.dvc_path);

    let mut step = 0;
    let mut report_stage = |state: RunState, elapsed: Duration| {
        let title = stage_title(state);
        if title.is_empty() {
            return;
        }
        step += 1;
        print_step_header(step, title);
        print_success(&format!("{} done", title));
        print_step_time(elapsed);
    };

    let spinner = create_spinner("Training...");
    let outcome = TrainingRun::new(config.clone(), &store, &store, &hasher)
        .on_stage(|state, elapsed| {
            spinner.suspend(|| report_stage(state, elapsed));
        })
        .execute();

    let summary = match outcome {
        Ok(summary) => {
            finish_with_success(&spinner, "Training run completed");
            summary
        }
        Err(e) => {
            finish_with_failure(&spinner, "Training run failed");
            return Err(e).context("Training run failed; alias left unchanged");
        }
    };

    display_run_summary(&summary);
    print_completion(&format!(
        "models:/{}@{} now serves version {}",
        summary.model_name, summary.alias, summary.version
    ));
    Ok(())
}

pub fn run_predict(args: &PredictArgs, tracking_root: &Path) -> Result<()> {
    let config = args.to_config();
    let store = FsTracking::new(tracking_root);

    print_info(&format!("Scoring {} with {}", config.input_path.display(), config.reference));
    let spinner = create_spinner("Running batch inference...");
    let report = match run_batch_inference(&config, &store) {
        Ok(report) => report,
        Err(e) => {
            finish_with_failure(&spinner, "Batch inference failed");
            return Err(e).with_context(|| {
                format!("Failed to score {}", config.input_path.display())
            });
        }
    };
    finish_with_success(
        &spinner,
        &format!(
            "Wrote {} prediction(s) to {}",
            style(report.rows).yellow().bold(),
            report.output_path.display()
        ),
    );
    Ok(())
}

pub fn run_serve(args: &ServeArgs, tracking_root: &Path) -> Result<()> {
    let config = args.to_config();
    let store = FsTracking::new(tracking_root);

    // Resolve before binding so a bad reference never opens the port
    let pipeline = load_pipeline(&store, &config.reference)
        .with_context(|| format!("Failed to load {}", config.reference))?;
    print_success(&format!("Loaded {}", config.reference));
    print_info(&format!("Listening on http://{}", config.addr));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime
        .block_on(serve(pipeline, config.addr))
        .with_context(|| format!("Server on {} failed", config.addr))?;
    Ok(())
}
