//! `graspd` – grasp controller daemon.
//!
//! Runs the grasp controller against a simulated gripper:
//!
//! 1. Loads `~/.grasp/config.toml` (or the path given as the first argument)
//!    with `GRASP_*` environment overrides.
//! 2. Builds the sensor mirror, the simulated gripper, and the controller,
//!    and puts an action server in front of it.
//! 3. Submits the configured target and streams per-tick feedback from the
//!    event bus until the goal finishes.
//! 4. Cancels the goal on **Ctrl-C** or when the configured deadline passes.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::Notify;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use grasp_control::{ActionServer, GoalController};
use grasp_hal::{SensorMirror, SimGripper};
use grasp_middleware::{BusReporter, EventBus, Topic, TopicReceiver};
use grasp_types::{GoalOutcome, GraspError, GraspPayload};

fn main() -> ExitCode {
    let _guard = grasp_control::init_tracing("graspd");

    print_banner();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);
    let (cfg, error) = config::load_or_default(&path);
    match error {
        None => println!("  Config: {}", path.display().to_string().bold()),
        Some(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(outcome) if outcome.is_success() => {
            println!("\n  {} {}", "✓".green().bold(), describe(outcome).green());
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            println!("\n  {} {}", "✗".yellow().bold(), describe(outcome).yellow());
            ExitCode::FAILURE
        }
        Err(e) => {
            println!("\n  {}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: config::Config) -> Result<GoalOutcome, GraspError> {
    let joints = cfg.joint_set()?;
    let thresholds = cfg.thresholds()?;
    let contacts = cfg.contacts(&joints)?;

    let mirror = Arc::new(SensorMirror::new(joints.clone(), thresholds.sample_timeout()));
    let gripper = Arc::new(
        contacts
            .into_iter()
            .fold(SimGripper::new(Arc::clone(&mirror), cfg.sim.step_rad), |g, (joint, limit)| {
                g.with_contact(joint, limit)
            }),
    );

    let bus = EventBus::default();
    let printer = spawn_feedback_printer(bus.subscribe_to(Topic::Feedback));

    let controller = GoalController::new(joints, thresholds, mirror, gripper.clone())?
        .with_reporter(Arc::new(BusReporter::new(bus)));
    let (client, server) = ActionServer::spawn(Arc::new(controller), 16);

    let interrupt = Arc::new(Notify::new());
    let on_interrupt = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – cancelling grasp …".yellow().bold());
        on_interrupt.notify_one();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    println!("  Target: {:?}\n", cfg.sim.target);
    let ticket = client.grasp(cfg.sim.target.clone()).await?;
    let goal = ticket.id();
    let outcome = ticket.outcome();
    tokio::pin!(outcome);

    let deadline = tokio::time::sleep(Duration::from_secs(cfg.sim.deadline_secs));
    let finished = tokio::select! {
        result = &mut outcome => Some(result?),
        _ = deadline => {
            warn!(goal = %goal, "grasp deadline passed, cancelling");
            None
        }
        _ = interrupt.notified() => None,
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            match client.cancel().await {
                // Finished on its own in the meantime.
                Ok(_) | Err(GraspError::NoActiveGoal) => {}
                Err(e) => return Err(e),
            }
            outcome.await?
        }
    };

    server.stop().await;
    printer.abort();
    info!(
        goal = %goal,
        publishes = gripper.publish_count(),
        positions = ?gripper.positions(),
        "grasp run complete"
    );
    Ok(outcome)
}

fn spawn_feedback_printer(mut feedback: TopicReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match feedback.recv().await {
                Ok(event) => {
                    if let GraspPayload::Feedback {
                        angles,
                        max_error,
                        stalled_joints,
                    } = event.payload
                    {
                        println!(
                            "  {} angles={:?} max_error={:.3} stalled={}",
                            event.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
                            angles,
                            max_error,
                            stalled_joints
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "feedback printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn describe(outcome: GoalOutcome) -> String {
    match outcome {
        GoalOutcome::Succeeded(reason) => format!("Grasp succeeded ({reason:?})"),
        GoalOutcome::Aborted(reason) => format!("Grasp aborted ({reason:?})"),
        GoalOutcome::Cancelled(reason) => format!("Grasp cancelled ({reason:?})"),
    }
}

fn print_banner() {
    println!();
    println!("  {} {}",
        "graspd".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Gripper grasp controller (simulated gripper)");
    println!();
}
