use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the relay functions workspace",
    long_about = "A unified CLI for running the function host locally, CI checks,\n\
                  and packaging the Azure Functions custom handler app."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the custom handler locally (reads configuration from the environment)
    Host,
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build the function host and zip it with host.json and function.json files
    Package {
        /// Compilation target triple for the host binary
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Build profile used for the binary
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
        /// Output zip path
        #[arg(long, default_value = "dist/functionapp.zip")]
        output: String,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting and clippy
    Lint,
    /// Workspace tests
    Test,
    /// Lint + test
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── Functions app layout ───────────────────────────────────────────

const HOST_BINARY: &str = "function_host";
const FUNCTION_NAMES: [&str; 2] = ["CopyBlob", "PublishAuditEvents"];

const FUNCTION_JSON: &str = r#"{
  "bindings": [
    {
      "authLevel": "function",
      "type": "httpTrigger",
      "direction": "in",
      "name": "req",
      "methods": ["get", "post"]
    },
    {
      "type": "http",
      "direction": "out",
      "name": "res"
    }
  ]
}
"#;

fn host_json(executable: &str) -> String {
    format!(
        r#"{{
  "version": "2.0",
  "logging": {{
    "logLevel": {{
      "default": "Information"
    }}
  }},
  "extensionBundle": {{
    "id": "Microsoft.Azure.Functions.ExtensionBundle",
    "version": "[4.*, 5.0.0)"
  }},
  "customHandler": {{
    "description": {{
      "defaultExecutablePath": "{executable}",
      "workingDirectory": "",
      "arguments": []
    }},
    "enableForwardingHttpRequest": true
  }}
}}
"#
    )
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn package_function_app(target: &str, profile: BuildProfile, output: &str) {
    ensure_rust_target_installed(target);
    ensure_c_linker_available(target);

    step("Build function host binary");

    let mut cargo_args = vec![
        "build",
        "-p",
        "relay_functions_azure",
        "--target",
        target,
        "--bin",
        HOST_BINARY,
    ];
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);

    step("Package Functions app zip");
    let target_dir = Path::new("target").join(target).join(profile.dir_name());
    let executable = binary_name(HOST_BINARY, target);
    let zip_path = Path::new(output);
    if let Some(parent) = zip_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).expect("failed to create package output directory");
    }

    package_app_zip(&target_dir.join(&executable), &executable, zip_path);

    eprintln!("\nPackaged artifact:\n- {}", zip_path.display());
}

fn ensure_rust_target_installed(target: &str) {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output();

    let output = match output {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return;
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "failed to list installed rust targets; run `rustup target list --installed` manually. details: {}",
            stderr.trim()
        );
    }

    let installed = String::from_utf8_lossy(&output.stdout);
    if !installed.lines().any(|line| line.trim() == target) {
        panic!(
            "required rust target `{target}` is not installed. install it with `rustup target add {target}` and re-run `cargo run -p xtask -- package`"
        );
    }
}

fn ensure_c_linker_available(target: &str) {
    if !cfg!(windows) || !target.ends_with("unknown-linux-gnu") {
        return;
    }

    let env_override_keys = [
        format!("CC_{}", target.replace('-', "_")),
        format!("CC_{target}"),
        "TARGET_CC".to_string(),
        "CC".to_string(),
    ];

    for key in env_override_keys {
        if let Ok(value) = std::env::var(&key) {
            let candidate = value.trim();
            if candidate.is_empty() {
                continue;
            }
            if tool_works(candidate) {
                return;
            }
        }
    }

    let canonical = "x86_64-linux-gnu-gcc";
    if tool_works(canonical) {
        return;
    }

    panic!(
        "missing C cross-linker for target `{target}`. install `{canonical}` (or set CC_x86_64_unknown_linux_gnu) before running `cargo run -p xtask -- package`.\n\
         Tip: the TLS stack (ring via rustls) compiles C sources, so a Linux C toolchain is needed when cross-compiling from Windows."
    );
}

fn tool_works(program: &str) -> bool {
    let mut parts = program.split_whitespace();
    let Some(bin) = parts.next() else {
        return false;
    };
    let args: Vec<&str> = parts.collect();

    Command::new(bin)
        .args(&args)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

fn package_app_zip(binary_path: &Path, executable: &str, zip_path: &Path) {
    if !binary_path.exists() {
        panic!("expected function host binary at '{}'", binary_path.display());
    }

    let binary = fs::read(binary_path).expect("failed to read function host binary");
    let file = fs::File::create(zip_path).expect("failed to create functions app zip");
    let mut zip = ZipWriter::new(file);
    let text_options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let binary_options = text_options.unix_permissions(0o755);

    zip.start_file("host.json", text_options)
        .expect("failed to start host.json entry");
    zip.write_all(host_json(executable).as_bytes())
        .expect("failed to write host.json entry");

    for function in FUNCTION_NAMES {
        zip.start_file(format!("{function}/function.json"), text_options)
            .expect("failed to start function.json entry");
        zip.write_all(FUNCTION_JSON.as_bytes())
            .expect("failed to write function.json entry");
    }

    zip.start_file(executable, binary_options)
        .expect("failed to start function host entry");
    zip.write_all(&binary)
        .expect("failed to write function host entry");
    zip.finish().expect("failed to finish functions app zip");
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_lint() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);
}

fn ci_test() {
    step("Test relay_functions_core");
    run_cargo(&["test", "-p", "relay_functions_core"]);

    step("Test relay_functions_azure");
    run_cargo(&["test", "-p", "relay_functions_azure"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Host => {
            run_cargo(&[
                "run",
                "-p",
                "relay_functions_azure",
                "--bin",
                HOST_BINARY,
            ]);
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Lint => ci_lint(),
                CiJob::Test => ci_test(),
                CiJob::Check => {
                    ci_lint();
                    ci_test();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::Package {
            target,
            profile,
            output,
        } => {
            package_function_app(&target, profile, &output);
        }
    }
}
