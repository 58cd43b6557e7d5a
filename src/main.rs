use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::error;
use tokio::io::{AsyncBufReadExt, BufReader};

use serial_terminal::console::{Command, Flow, HELP, Terminal, TerminalEvent};
use serial_terminal::error::{Result, TerminalError};
use serial_terminal::serial::LineEnding;
use serial_terminal::serial::port::{NativeBackend, list_ports, parse_baud_rate};
use serial_terminal::settings::{Preferences, SETTINGS_FILE};

/// ANSI sequence clearing the screen.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Parser, Debug)]
#[command(name = "serial_terminal", version, about = "Interactive serial port terminal")]
struct Args {
    /// Preferences file, read at startup and written on exit
    #[arg(long, default_value = SETTINGS_FILE)]
    settings: PathBuf,
    /// Port to select instead of the saved one
    #[arg(long)]
    port: Option<String>,
    /// Baud rate to select instead of the saved one
    #[arg(long, value_parser = baud_rate_arg)]
    baud: Option<u32>,
    /// Line ending appended to sent lines: none, lf, cr, crlf
    #[arg(long)]
    line_ending: Option<LineEnding>,
    /// Detect the baud rate when connecting
    #[arg(long)]
    auto_detect: bool,
    /// Connect immediately
    #[arg(long)]
    connect: bool,
    /// Print the available ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn baud_rate_arg(value: &str) -> std::result::Result<u32, String> {
    parse_baud_rate(value).ok_or_else(|| format!("unsupported baud rate '{value}'"))
}

enum Input {
    Line(std::io::Result<Option<Vec<u8>>>),
    Event(TerminalEvent),
    Interrupt,
}

fn report(e: &TerminalError) {
    let title = match e {
        TerminalError::Connection(_) => "Connection Error",
        TerminalError::Send(_) => "Send Error",
        _ => "Error",
    };
    error!("{title}: {e}");
    eprintln!("[{title}] {e}");
}

async fn run_command(terminal: &mut Terminal, command: Command) -> Flow {
    let clear = command == Command::Clear;
    match terminal.handle(command).await {
        Ok(flow) => {
            if clear {
                print!("{CLEAR_SCREEN}");
                let _ = std::io::stdout().flush();
            }
            flow
        }
        Err(e) => {
            report(&e);
            Flow::Continue
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_ports {
        for name in list_ports() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut terminal = Terminal::new(Arc::new(NativeBackend));
    terminal.apply_preferences(&Preferences::load_or_default(&args.settings));

    let mut overrides = Vec::new();
    if let Some(port) = args.port {
        overrides.push(Command::Port(port));
    }
    if let Some(baud_rate) = args.baud {
        overrides.push(Command::Baud(baud_rate));
    }
    if let Some(line_ending) = args.line_ending {
        overrides.push(Command::Ending(line_ending));
    }
    if args.auto_detect {
        overrides.push(Command::Auto(true));
    }
    if args.connect {
        overrides.push(Command::Toggle);
    }

    print!("{HELP}");
    print!("{}", terminal.status());
    for command in overrides {
        run_command(&mut terminal, command).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).split(b'\n');
    loop {
        let input = tokio::select! {
            line = lines.next_segment() => Input::Line(line),
            event = terminal.next_event() => Input::Event(event),
            _ = tokio::signal::ctrl_c() => Input::Interrupt,
        };

        match input {
            Input::Line(Ok(None)) | Input::Interrupt => break,
            Input::Line(Err(e)) => {
                report(&TerminalError::Console(e));
                break;
            }
            Input::Line(Ok(Some(line))) => {
                let flow = match Command::parse_bytes(&line) {
                    Ok(command) => run_command(&mut terminal, command).await,
                    Err(e) => {
                        report(&e);
                        Flow::Continue
                    }
                };
                if flow == Flow::Quit {
                    break;
                }
            }
            Input::Event(TerminalEvent::Output(entry)) => {
                print!("{entry}");
                let _ = std::io::stdout().flush();
            }
            Input::Event(TerminalEvent::ScanFinished(scan)) => {
                if let Err(e) = terminal.finish_scan(scan).await {
                    report(&TerminalError::from(e));
                }
            }
        }
    }

    if let Err(e) = terminal.shutdown(&args.settings).await {
        report(&e);
    }
    Ok(())
}
