// Query Profile Analyzer - task runner (cargo xtask pattern)

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use xshell::{Shell, cmd};

const PACKAGE: &str = "query-profile-analyzer";
const BINARY: &str = "profile-analyzer";

enum Task {
    Build { release: bool },
    Test,
    Format { check: bool },
    Clippy,
    Run { args: Vec<String> },
    Clean,
    Coverage,
    Ci,
    Dist,
    Help,
}

impl Task {
    fn parse(mut args: Vec<String>) -> Result<Self> {
        if args.is_empty() {
            return Ok(Task::Help);
        }
        let name = args.remove(0);
        let release = args.iter().any(|a| a == "--release");
        let check = args.iter().any(|a| a == "--check");

        let task = match name.as_str() {
            "build" => Task::Build { release },
            "test" => Task::Test,
            "format" | "fmt" => Task::Format { check },
            "clippy" => Task::Clippy,
            "run" => Task::Run {
                args: args.into_iter().skip_while(|a| a == "--").collect(),
            },
            "clean" => Task::Clean,
            "coverage" => Task::Coverage,
            "ci" => Task::Ci,
            "dist" => Task::Dist,
            "help" | "-h" | "--help" => Task::Help,
            other => bail!("unknown task '{}', run `cargo xtask help`", other),
        };
        Ok(task)
    }
}

fn main() -> Result<()> {
    let sh = Shell::new()?;
    sh.change_dir(project_root());

    match Task::parse(std::env::args().skip(1).collect())? {
        Task::Build { release } => build(&sh, release),
        Task::Test => test(&sh),
        Task::Format { check } => format(&sh, check),
        Task::Clippy => clippy(&sh),
        Task::Run { args } => run(&sh, &args),
        Task::Clean => clean(&sh),
        Task::Coverage => coverage(&sh),
        Task::Ci => ci(&sh),
        Task::Dist => dist(&sh),
        Task::Help => {
            print_help();
            Ok(())
        },
    }
}

fn print_help() {
    println!("Usage: cargo xtask <TASK> [OPTIONS]");
    println!();
    println!("Tasks:");
    println!("  build [--release]   Build the analyzer library and CLI");
    println!("  test                Run the workspace test suite");
    println!("  format [--check]    Run rustfmt (--check only reports)");
    println!("  clippy              Lint all targets, warnings are errors");
    println!("  run [-- ARGS...]    Run {} with ARGS", BINARY);
    println!("  clean               Remove target/ and build/");
    println!("  coverage            HTML and XML coverage under build/coverage");
    println!("  ci                  format --check, clippy, build --release, test");
    println!("  dist                Package the release binary and default config");
    println!();
    println!("Example:");
    println!("  cargo xtask run -- --profile profile.json contributors --top 5");
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    let profile = if release { "--release" } else { "--profile=dev" };
    cmd!(sh, "cargo build {profile} -p {PACKAGE}")
        .run()
        .with_context(|| format!("cargo build {} failed", profile))?;
    println!("✅ {} built", PACKAGE);
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo test --workspace").run().context("Tests failed")?;
    println!("✅ All tests passed");
    Ok(())
}

fn format(sh: &Shell, check: bool) -> Result<()> {
    let check_args: &[&str] = if check { &["--", "--check"] } else { &[] };
    cmd!(sh, "cargo fmt --all {check_args...}")
        .run()
        .context(if check { "Code is not formatted, run `cargo xtask format`" } else { "rustfmt failed" })?;
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --workspace --all-targets -- --deny warnings --allow clippy::uninlined-format-args")
        .run()
        .context("Clippy checks failed")?;
    Ok(())
}

fn run(sh: &Shell, args: &[String]) -> Result<()> {
    cmd!(sh, "cargo run -p {PACKAGE} --bin {BINARY} -- {args...}")
        .run()
        .context("Analyzer exited with an error")?;
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clean").run()?;
    sh.remove_path(project_root().join("build"))?;
    println!("✅ Clean complete");
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    let steps: [(&str, fn(&Shell) -> Result<()>); 4] = [
        ("format", |sh| format(sh, true)),
        ("clippy", clippy),
        ("build", |sh| build(sh, true)),
        ("test", test),
    ];

    for (i, (name, step)) in steps.iter().enumerate() {
        println!("🔄 [{}/{}] {}", i + 1, steps.len(), name);
        step(sh)?;
    }

    println!("🎉 CI pipeline completed successfully");
    Ok(())
}

fn dist(sh: &Shell) -> Result<()> {
    build(sh, true)?;

    let root = project_root();
    let dist_dir = root.join("build/dist");
    sh.remove_path(&dist_dir)?;
    sh.create_dir(dist_dir.join("bin"))?;
    sh.create_dir(dist_dir.join("conf"))?;

    sh.copy_file(root.join("target/release").join(BINARY), dist_dir.join("bin"))
        .context("Release binary not found")?;
    sh.copy_file(root.join("analyzer/conf/config.toml"), dist_dir.join("conf"))
        .context("Default config not found")?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let archive = format!("{}-{}.tar.gz", BINARY, timestamp);
    {
        let _dir = sh.push_dir(&dist_dir);
        cmd!(sh, "tar czf {archive} bin conf").run().context("Failed to create tarball")?;
    }

    println!("✅ {}", dist_dir.join(archive).display());
    Ok(())
}

fn coverage(sh: &Shell) -> Result<()> {
    if cmd!(sh, "cargo tarpaulin --version").quiet().ignore_stdout().run().is_err() {
        println!("⚠️  cargo-tarpaulin not found, installing");
        cmd!(sh, "cargo install cargo-tarpaulin")
            .run()
            .context("Failed to install cargo-tarpaulin")?;
    }

    cmd!(sh, "cargo tarpaulin --workspace --out Html --out Xml --output-dir build/coverage")
        .run()
        .context("Failed to generate coverage report")?;

    println!("✅ build/coverage/index.html");
    Ok(())
}

/// Workspace root, one level above this crate
fn project_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().map(PathBuf::from).unwrap_or(manifest_dir)
}
