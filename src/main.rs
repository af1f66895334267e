use clap::Parser;
use dirs::home_dir;
use log::{debug, info};
use nu_ansi_term::{Color, Style};
use reedline::{DefaultHinter, FileBackedHistory, Reedline, Signal};
use std::{fs, path::PathBuf, process::ExitCode};

use megaladon::{
    cli::{Args, Commands},
    error::{DiagnosticKind, Diagnostics},
    parser::parse,
    repl::{REPLPrompt, REPLValidator, SyntaxHighlighter},
    run_program_in, run_statement,
    runtime::{Interpreter, Value},
    tokenizer::scan,
};

// Conventional exit codes: 65 for malformed input, 70 for a runtime
// failure, 74 for an I/O problem.
const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;
const EX_IOERR: u8 = 74;

fn report(diagnostics: &Diagnostics) -> ExitCode {
    if diagnostics.is_empty() {
        return ExitCode::SUCCESS;
    }
    for diagnostic in diagnostics.iter() {
        eprintln!("{}", diagnostic);
    }
    if diagnostics.has(DiagnosticKind::Lexical) || diagnostics.has(DiagnosticKind::Syntax) {
        ExitCode::from(EX_DATAERR)
    } else {
        ExitCode::from(EX_SOFTWARE)
    }
}

fn read_source(file: &PathBuf) -> Result<String, ExitCode> {
    fs::read_to_string(file).map_err(|err| {
        eprintln!("Could not read {}: {}", file.display(), err);
        ExitCode::from(EX_IOERR)
    })
}

fn run_file(file: PathBuf, args: Vec<String>) -> ExitCode {
    let source = match read_source(&file) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let mut interpreter = Interpreter::new();
    let globals = interpreter.globals();
    let argv = Value::list(args.into_iter().map(Value::String).collect());
    interpreter.environment().define(globals, "args", argv);

    let diagnostics = run_program_in(&source, &mut interpreter);
    report(&diagnostics)
}

fn check_file(file: PathBuf) -> ExitCode {
    let source = match read_source(&file) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let (tokens, mut diagnostics) = scan(&source);
    let (_, parse_diagnostics) = parse(&tokens);
    diagnostics.extend(parse_diagnostics);
    report(&diagnostics)
}

fn run_repl() -> ExitCode {
    let mut line_editor = Reedline::create()
        .with_hinter(Box::new(
            DefaultHinter::default().with_style(Style::new().italic().fg(Color::LightGray)),
        ))
        .with_highlighter(Box::new(SyntaxHighlighter))
        .with_validator(Box::new(REPLValidator));

    // Add file-backed history if possible
    if let Some(history) = home_dir()
        .map(|home| home.join(".megaladon_history"))
        .and_then(|path| FileBackedHistory::with_file(100, path).ok())
        .map(Box::new)
    {
        line_editor = line_editor.with_history(history);
    } else {
        eprintln!("NOTE: Failed to load history. Persistence is now disabled.")
    }

    let prompt = REPLPrompt;
    let mut interpreter = Interpreter::new();

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                let (diagnostics, value) = run_statement(&buffer, &mut interpreter);
                for diagnostic in diagnostics.iter() {
                    eprintln!("{}", diagnostic);
                }
                if let Some(value) = value {
                    println!("{:?}", value);
                }
            }
            Ok(Signal::CtrlD) | Ok(Signal::CtrlC) => {
                break ExitCode::SUCCESS;
            }
            Err(err) => {
                eprintln!("{}", err);
                break ExitCode::FAILURE;
            }
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Run { file, args } => {
            info!("FILE MODE");
            debug!("file: {:?}", file);
            debug!("args: {:?}", args);

            run_file(file, args)
        }
        Commands::Check { file } => {
            info!("CHECK MODE");
            debug!("file: {:?}", file);

            check_file(file)
        }
        Commands::Repl => {
            info!("REPL MODE");

            run_repl()
        }
    }
}
