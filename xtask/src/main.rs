use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const SHELLS: [&str; 3] = ["bash", "zsh", "fish"];

fn repo_root() -> PathBuf {
    // xtask's manifest dir is `<repo>/xtask`
    let xtask_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    xtask_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(xtask_dir)
}

fn run(cmd: &str, args: &[&str]) -> Result<(), String> {
    let status = Command::new(cmd)
        .args(args)
        .current_dir(repo_root())
        .status()
        .map_err(|e| format!("failed to spawn {cmd}: {e}"))?;
    if !status.success() {
        return Err(format!("command failed: {} {}", cmd, args.join(" ")));
    }
    Ok(())
}

/// Runs `cmd` and writes its stdout to `dest`.
fn capture(cmd: &str, args: &[&str], dest: &Path) -> Result<(), String> {
    let output = Command::new(cmd)
        .args(args)
        .current_dir(repo_root())
        .output()
        .map_err(|e| format!("failed to spawn {cmd}: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "command failed: {} {}\n{}",
            cmd,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    fs::write(dest, output.stdout).map_err(|e| format!("failed to write {}: {e}", dest.display()))
}

fn print_usage() {
    eprintln!("xtask usage:\n  cargo xtask ci\n  cargo xtask dist-assets\n  cargo xtask help");
}

fn main() -> ExitCode {
    let cmd = env::args().nth(1).unwrap_or_else(|| "help".to_string());

    let res = match cmd.as_str() {
        "ci" => task_ci(),
        "dist-assets" => task_dist_assets(),
        "help" | "-h" | "--help" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("unknown subcommand: {other}\n");
            print_usage();
            Err("unknown subcommand".into())
        }
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn task_ci() -> Result<(), String> {
    println!("Running CI checks (fmt, clippy, test, build)...");
    run("cargo", &["fmt", "--", "--check"])?;
    run("cargo", &["clippy", "--all-targets", "--", "-D", "warnings"])?;
    run("cargo", &["test"])?;
    run("cargo", &["build", "--release"])?;
    println!("CI checks passed");
    Ok(())
}

/// Shell completions and the man page, under `target/assets/`.
fn task_dist_assets() -> Result<(), String> {
    let assets = repo_root().join("target").join("assets");
    let completions = assets.join("completions");
    let man = assets.join("man");
    for dir in [&completions, &man] {
        fs::create_dir_all(dir).map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
    }

    for shell in SHELLS {
        let file = match shell {
            "zsh" => "_stampede".to_string(),
            other => format!("stampede.{other}"),
        };
        let dest = completions.join(file);
        capture(
            "cargo",
            &["run", "--quiet", "--", "completions", shell],
            &dest,
        )?;
        println!("wrote {}", dest.display());
    }

    let dest = man.join("stampede.1");
    capture("cargo", &["run", "--quiet", "--", "man"], &dest)?;
    println!("wrote {}", dest.display());
    Ok(())
}
