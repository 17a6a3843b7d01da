use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use emu86_core::cpu_8086::StopReason;
use emu86_core::logging::{LogCategory, LogConfig, LogLevel};
use emu86_core::System;
use emu86_pc::{PcConfig, PcCpuModel, PcSystem};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "emu86", version, about = "Run DOS .COM programs on an emulated 8086 PC")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Core log level for every category (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Instruction trace level (trace prints every executed instruction)
    #[arg(long, global = true)]
    log_cpu: Option<String>,

    /// Interrupt dispatch and BIOS service level
    #[arg(long, global = true)]
    log_interrupts: Option<String>,

    /// Write core logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Maximum core log messages per second per category
    #[arg(long, global = true)]
    log_rate: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Load a .COM image and run it until it terminates or halts
    Run(RunArgs),
    /// List the instructions of a .COM image from its entry point
    Disasm(DisasmArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Path to the .COM image
    file: PathBuf,

    /// CPU model: 8086, 8088, 80186 or 80188
    #[arg(long, default_value = "8086")]
    cpu: String,

    /// Conventional memory in KB
    #[arg(long, default_value_t = 640)]
    memory: u16,

    /// Stop after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,

    /// Text typed into the keyboard buffer before the program starts
    #[arg(long)]
    input: Option<String>,

    /// Command tail placed in the PSP (e.g. " /v file.txt")
    #[arg(long, default_value = "")]
    tail: String,

    /// Dump the final save-state to this file as JSON
    #[arg(long)]
    dump_state: Option<PathBuf>,

    /// Stream console output while the program runs
    #[arg(long, default_value_t = false)]
    echo: bool,

    /// Print the text screen instead of the console transcript
    #[arg(long, default_value_t = false)]
    screen: bool,
}

#[derive(Parser)]
struct DisasmArgs {
    /// Path to the .COM image
    file: PathBuf,

    /// CPU model used for decoding
    #[arg(long, default_value = "8086")]
    cpu: String,

    /// Maximum number of instructions to list
    #[arg(long, default_value_t = 64)]
    count: usize,
}

fn parse_level(name: &str) -> Result<LogLevel> {
    match LogLevel::from_str(name) {
        Some(level) => Ok(level),
        None => bail!("Unknown log level: {}", name),
    }
}

fn parse_model(name: &str) -> Result<PcCpuModel> {
    match PcCpuModel::from_name(name) {
        Some(model) => Ok(model),
        None => bail!("Unsupported CPU model: {}", name),
    }
}

fn configure_logging(cli: &Cli) -> Result<()> {
    let config = LogConfig::global();
    if let Some(level) = cli.log_level.as_deref() {
        config.set_global_level(parse_level(level)?);
    }
    if let Some(level) = cli.log_cpu.as_deref() {
        config.set_level(LogCategory::CPU, parse_level(level)?);
    }
    if let Some(level) = cli.log_interrupts.as_deref() {
        let level = parse_level(level)?;
        config.set_level(LogCategory::Interrupts, level);
        config.set_level(LogCategory::Bios, level);
    }
    if let Some(rate) = cli.log_rate {
        config.set_rate_limit(rate);
    }
    if let Some(path) = cli.log_file.as_ref() {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn run(args: RunArgs) -> Result<Option<u8>> {
    let image = read_image(&args.file)?;
    let mut sys = PcSystem::with_config(PcConfig {
        cpu_model: parse_model(&args.cpu)?,
        memory_kb: args.memory,
        echo_console: args.echo,
        max_steps: args.max_steps,
        ..PcConfig::default()
    });
    sys.load_com(&image, &args.tail)?;
    if let Some(input) = args.input.as_deref() {
        sys.type_text(input);
    }

    log::info!(
        "running {} ({} bytes) on {}",
        args.file.display(),
        image.len(),
        sys.cpu_model().name()
    );
    let summary = sys.run_until_halt(None)?;
    if summary.reason == StopReason::StepLimit {
        log::warn!("stopped after {} steps without terminating", summary.steps);
    }

    if args.screen {
        println!("{}", sys.screen_text());
    } else if !args.echo {
        print!("{}", sys.console_output());
    }
    std::io::stdout().flush()?;
    log::info!("{}", sys.debug_info());

    if let Some(path) = args.dump_state.as_ref() {
        let state = sys.save_state();
        let mut f = File::create(path)?;
        write!(f, "{}", serde_json::to_string_pretty(&state)?)?;
        log::info!("save-state written to {}", path.display());
    }

    Ok(sys.exit_code())
}

fn disasm(args: DisasmArgs) -> Result<()> {
    let image = read_image(&args.file)?;
    let mut sys = PcSystem::with_cpu_model(parse_model(&args.cpu)?);
    sys.load_com(&image, "")?;

    let regs = sys.cpu().get_registers();
    let mut offset = 0usize;
    for (_, bytes, instr) in sys.disassemble(args.count) {
        if offset >= image.len() {
            break;
        }
        let hex: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        println!(
            "{:04X}:{:04X}  {:<14}{}",
            regs.cs,
            regs.ip as usize + offset,
            hex.join(" "),
            instr
        );
        offset += bytes.len();
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    configure_logging(&cli)?;

    match cli.command {
        Command::Run(args) => {
            if let Some(code) = run(args)? {
                if code != 0 {
                    LogConfig::global().clear_log_file();
                    std::process::exit(i32::from(code));
                }
            }
        }
        Command::Disasm(args) => disasm(args)?,
    }

    Ok(())
}
