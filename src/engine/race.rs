//! EngineRace: launch every applicable engine at the same instant, adopt the
//! first valid artifact, cancel the rest.
//!
//! Engines are pure side-effect producers here: the supervisor never looks
//! past "did the promised artifact appear with non-trivial size, or did the
//! process exit cleanly". Each engine writes into its own scratch directory
//! under the destination's parent, so the winning rename is atomic and two
//! engines can never collide on the final output path.

use crate::config::Config;
use crate::error::FatalError;
use crate::util::{ensure_dir, file_at_least};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::registry::{EngineDescriptor, OutputNaming};

#[derive(Debug, Clone, Serialize)]
pub struct EngineDiagnostic {
    pub engine: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceOutcome {
    pub winner: Option<String>,
    pub duration_ms: u128,
    pub diagnostics: Vec<EngineDiagnostic>,
}

impl RaceOutcome {
    pub fn won(&self) -> bool {
        self.winner.is_some()
    }
}

/// Supervisor states. Transitions: a valid artifact or clean exit moves
/// `Racing -> WinnerDeclared`; timeout or all-failed moves `Racing ->
/// Cancelling`; cancellation always ends in `Done`.
#[derive(Debug, PartialEq, Eq)]
enum RaceState {
    Racing,
    WinnerDeclared(usize),
    Cancelling,
    Done,
}

enum RunnerStatus {
    Running,
    Failed,
}

struct Runner {
    name: String,
    child: Child,
    artifact: PathBuf,
    stderr_path: PathBuf,
    status: RunnerStatus,
}

/// Removes the race's scratch tree on every exit path unless the caller
/// asked to keep intermediates.
struct ScratchRoot {
    path: PathBuf,
    keep: bool,
}

impl Drop for ScratchRoot {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

pub fn race(
    input: &Path,
    final_output: &Path,
    engines: &[EngineDescriptor],
    cfg: &Config,
) -> Result<RaceOutcome> {
    let started = Instant::now();

    if engines.is_empty() {
        return Err(FatalError::MissingDependency(
            "no conversion engine is applicable on this platform".into(),
        )
        .into());
    }

    let dest_dir = final_output.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(dest_dir)?;
    let scratch = ScratchRoot {
        path: dest_dir.join(format!(".docshift-race-{}", std::process::id())),
        keep: cfg.global.keep_intermediates,
    };
    ensure_dir(&scratch.path)?;

    let mut diagnostics = Vec::new();
    let mut runners = Vec::new();
    let mut missing = 0usize;

    for desc in engines {
        match spawn_engine(desc, input, final_output, &scratch.path) {
            Ok(runner) => {
                info!("engine launched: {} ({})", desc.name, desc.program);
                runners.push(runner);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("engine unavailable: {} ({})", desc.name, desc.program);
                missing += 1;
                diagnostics.push(EngineDiagnostic {
                    engine: desc.name.clone(),
                    message: format!("not installed: {}", desc.program),
                });
            }
            Err(err) => {
                warn!("engine {} failed to launch: {err}", desc.name);
                diagnostics.push(EngineDiagnostic {
                    engine: desc.name.clone(),
                    message: format!("spawn failed: {err}"),
                });
            }
        }
    }

    if runners.is_empty() {
        if missing == engines.len() {
            return Err(FatalError::MissingDependency(format!(
                "none of the {} registered engines is installed",
                engines.len()
            ))
            .into());
        }
        return Ok(RaceOutcome {
            winner: None,
            duration_ms: started.elapsed().as_millis(),
            diagnostics,
        });
    }

    let timeout = Duration::from_secs(cfg.race.timeout_seconds);
    let poll = Duration::from_millis(cfg.race.poll_interval_ms.max(1));
    let mut state = RaceState::Racing;

    while state == RaceState::Racing {
        // Runners are held in priority order, so the first index to cross
        // the threshold in a tick is also the deterministic tie-break.
        for (idx, runner) in runners.iter_mut().enumerate() {
            if matches!(runner.status, RunnerStatus::Failed) {
                continue;
            }

            if file_at_least(&runner.artifact, cfg.race.min_artifact_bytes) {
                state = RaceState::WinnerDeclared(idx);
                break;
            }

            match runner.child.try_wait().with_context(|| "try_wait")? {
                Some(status) if status.success() => {
                    if file_at_least(&runner.artifact, 1) {
                        state = RaceState::WinnerDeclared(idx);
                        break;
                    }
                    runner.status = RunnerStatus::Failed;
                    diagnostics.push(EngineDiagnostic {
                        engine: runner.name.clone(),
                        message: "exited 0 but produced no artifact".into(),
                    });
                }
                Some(status) => {
                    runner.status = RunnerStatus::Failed;
                    diagnostics.push(EngineDiagnostic {
                        engine: runner.name.clone(),
                        message: format!("exited {status}: {}", stderr_tail(&runner.stderr_path)),
                    });
                }
                None => {}
            }
        }

        if state != RaceState::Racing {
            break;
        }

        if runners
            .iter()
            .all(|r| matches!(r.status, RunnerStatus::Failed))
        {
            debug!("all engines failed before timeout");
            state = RaceState::Cancelling;
            break;
        }

        if started.elapsed() > timeout {
            warn!("race timed out after {timeout:?}");
            for runner in runners.iter_mut() {
                if matches!(runner.status, RunnerStatus::Running) {
                    diagnostics.push(EngineDiagnostic {
                        engine: runner.name.clone(),
                        message: format!("timed out after {}s", cfg.race.timeout_seconds),
                    });
                }
            }
            state = RaceState::Cancelling;
            break;
        }

        std::thread::sleep(poll);
    }

    let winner = match state {
        RaceState::WinnerDeclared(idx) => {
            let name = runners[idx].name.clone();
            info!(
                "winner declared: {} after {:?}",
                name,
                started.elapsed()
            );
            cancel_losers(&mut runners, Some(idx), cfg);
            adopt_artifact(&runners[idx].artifact, final_output)?;
            state = RaceState::Done;
            Some(name)
        }
        RaceState::Cancelling => {
            cancel_losers(&mut runners, None, cfg);
            state = RaceState::Done;
            None
        }
        _ => None,
    };
    debug_assert_eq!(state, RaceState::Done);

    Ok(RaceOutcome {
        winner,
        duration_ms: started.elapsed().as_millis(),
        diagnostics,
    })
}

fn spawn_engine(
    desc: &EngineDescriptor,
    input: &Path,
    final_output: &Path,
    scratch_root: &Path,
) -> std::io::Result<Runner> {
    let scratch = scratch_root.join(&desc.name);
    std::fs::create_dir_all(&scratch)?;

    let artifact = match &desc.naming {
        OutputNaming::Requested => {
            let ext = final_output
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("out");
            scratch.join(format!("artifact.{ext}"))
        }
        OutputNaming::InputStem { extension } => {
            let stem = output_stem(input);
            scratch.join(format!("{stem}.{extension}"))
        }
    };

    let stderr_path = scratch.join("stderr.log");
    let stdout_file = File::create(scratch.join("stdout.log"))?;
    let stderr_file = File::create(&stderr_path)?;

    let args: Vec<String> = desc
        .args
        .iter()
        .map(|a| {
            a.replace("{input}", &input.display().to_string())
                .replace("{outdir}", &scratch.display().to_string())
                .replace("{output}", &artifact.display().to_string())
        })
        .collect();

    let child = Command::new(&desc.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .spawn()?;

    Ok(Runner {
        name: desc.name.clone(),
        child,
        artifact,
        stderr_path,
        status: RunnerStatus::Running,
    })
}

/// Stem the input would keep through an `.enc` strip and the extension swap
/// a stem-naming engine performs.
fn output_stem(input: &Path) -> String {
    let name = input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("input");
    let name = name.strip_suffix(".enc").unwrap_or(name);
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input")
        .to_string()
}

/// Termination is best-effort cleanup, never a correctness dependency: kill,
/// wait out the grace period, and move on even if a straggler survives.
fn cancel_losers(runners: &mut [Runner], winner: Option<usize>, cfg: &Config) {
    for (idx, runner) in runners.iter_mut().enumerate() {
        if Some(idx) == winner || matches!(runner.status, RunnerStatus::Failed) {
            continue;
        }
        if let Err(err) = runner.child.kill() {
            debug!("kill {}: {err}", runner.name);
        }
    }

    let grace = Duration::from_millis(cfg.race.grace_period_ms);
    let deadline = Instant::now() + grace;
    loop {
        let mut pending = false;
        for (idx, runner) in runners.iter_mut().enumerate() {
            if Some(idx) == winner || matches!(runner.status, RunnerStatus::Failed) {
                continue;
            }
            match runner.child.try_wait() {
                Ok(Some(_)) => runner.status = RunnerStatus::Failed,
                Ok(None) => pending = true,
                Err(_) => runner.status = RunnerStatus::Failed,
            }
        }
        if !pending || Instant::now() >= deadline {
            if pending {
                warn!("straggler engine survived the grace period");
            }
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    // Reap the winner too if it already exited; leave it otherwise.
    if let Some(idx) = winner {
        let _ = runners[idx].child.try_wait();
    }
}

/// Moves the winning artifact onto the final output path. Scratch lives next
/// to the destination, so the rename is atomic; the copy branch only covers
/// callers pointing output at another filesystem.
fn adopt_artifact(artifact: &Path, final_output: &Path) -> Result<()> {
    if final_output.exists() {
        std::fs::remove_file(final_output)
            .with_context(|| format!("replacing {}", final_output.display()))?;
    }
    match std::fs::rename(artifact, final_output) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(artifact, final_output)
                .with_context(|| format!("adopting artifact into {}", final_output.display()))?;
            let _ = std::fs::remove_file(artifact);
            Ok(())
        }
    }
}

fn stderr_tail(path: &Path) -> String {
    const TAIL: usize = 400;
    match std::fs::read_to_string(path) {
        Ok(s) => {
            let s = s.trim();
            if s.len() > TAIL {
                // Engines emit localized, multibyte stderr; never slice
                // inside a character.
                let mut i = s.len() - TAIL;
                while !s.is_char_boundary(i) {
                    i += 1;
                }
                format!("...{}", &s[i..])
            } else {
                s.to_string()
            }
        }
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stem_strips_enc_and_extension() {
        assert_eq!(output_stem(Path::new("/tmp/report.docx")), "report");
        assert_eq!(output_stem(Path::new("/tmp/report.docx.enc")), "report");
    }

    #[test]
    fn stderr_tail_truncates_on_char_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stderr.log");

        // 600 bytes of three-byte characters: the 400-byte cut lands inside
        // a character and must be nudged forward, not panic.
        std::fs::write(&path, "€".repeat(200)).unwrap();
        let tail = stderr_tail(&path);
        assert!(tail.starts_with("..."));
        assert!(tail.chars().skip(3).all(|c| c == '€'));

        std::fs::write(&path, "short error").unwrap();
        assert_eq!(stderr_tail(&path), "short error");
    }
}
