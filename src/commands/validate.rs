use crate::commands::run::resolve_config;
use crate::engine::executor::TickPlan;
use crate::scenario::register::REGISTER_PATH;
use crate::utils::format_duration;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

/// Loads and validates a config, then prints the plan it describes. No
/// traffic is sent.
pub fn handle_validate(path: &Path) -> Result<()> {
    let config = resolve_config(Some(path), &Default::default())?;
    let thresholds = config.threshold_set()?;
    let scenario = &config.scenario;
    let plan = TickPlan::from_config(scenario);

    println!("{} {} is valid", "✔".green().bold(), path.display());
    println!();
    println!("  Endpoint:      POST {}", config.endpoint(REGISTER_PATH)?);
    println!("  Executor:      {}", scenario.executor);
    match scenario.executor {
        crate::config::ExecutorKind::ConstantArrivalRate => {
            println!(
                "  Rate:          {} per {}",
                scenario.rate,
                format_duration(scenario.time_unit)
            );
        }
        crate::config::ExecutorKind::RampingArrivalRate => {
            println!(
                "  Start rate:    {} per {}",
                scenario.start_rate,
                format_duration(scenario.time_unit)
            );
            for (i, stage) in scenario.stages.iter().enumerate() {
                println!(
                    "  Stage {:<8} {} to {}",
                    format!("{}:", i + 1),
                    format_duration(stage.duration),
                    stage.target
                );
            }
        }
    }
    println!("  Duration:      {}", format_duration(plan.span()));
    println!("  Iterations:    {}", plan.expected_ticks().to_string().bright_white());
    println!(
        "  VUs:           {} pre-allocated, {} max",
        scenario.pre_allocated_vus, scenario.max_vus
    );
    println!("  Drop policy:   {:?}", scenario.drop_policy);
    println!(
        "  Timeouts:      request {}, graceful stop {}",
        format_duration(config.request_timeout),
        format_duration(scenario.graceful_stop)
    );

    if !thresholds.is_empty() {
        println!("  Thresholds ({}):", thresholds.len());
        for spec in thresholds.iter() {
            println!("    {}: {}", spec.metric(), spec.expression());
        }
    }

    Ok(())
}
