mod debug_report;

use std::io::{self, IsTerminal, Read};
use storymark::{Config, Engine, Passage, Story, wikify_verbose_with};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "STORYMARK_LOG";

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let story: Story = config.passages.into_iter().collect();
    let engine = match Engine::builder().config(config.engine).story(story).build() {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    match wikify_verbose_with(&engine, &config.input) {
        Ok(res) => {
            if config.html_only {
                println!("{}", res.result.html);
            } else {
                debug_report::print_run(&res, config.color);
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

struct CliConfig {
    input: String,
    engine: Config,
    passages: Vec<Passage>,
    color: bool,
    html_only: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut engine = Config::default();
    let mut passages = Vec::new();
    let mut color = io::stdout().is_terminal();
    let mut html_only = false;
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("storymark {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--html" => html_only = true,
            "--nobr" => engine.nobr = true,
            "--max-loop" => {
                let value = args.next().ok_or_else(|| "error: --max-loop expects a value".to_string())?;
                engine.max_loop_iterations = parse_limit("--max-loop", &value)?;
            }
            "--max-depth" => {
                let value = args.next().ok_or_else(|| "error: --max-depth expects a value".to_string())?;
                engine.max_call_depth = parse_limit("--max-depth", &value)?;
            }
            "--passage" | "-p" => {
                let value = args.next().ok_or_else(|| "error: --passage expects a value".to_string())?;
                passages.push(parse_passage(&value)?);
            }
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(value);
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    if input.is_some() {
                        return Err("error: input provided multiple times".to_string());
                    }
                    input = Some(rest);
                }
                break;
            }
            _ if arg.starts_with("--passage=") => {
                passages.push(parse_passage(arg.trim_start_matches("--passage="))?);
            }
            _ if arg.starts_with("--input=") => {
                let value = arg.trim_start_matches("--input=");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(value.to_string());
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(rest);
                break;
            }
        }
    }

    let input = match input {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    if input.trim().is_empty() {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { input, engine, passages, color, html_only })
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn parse_limit(flag: &str, value: &str) -> Result<usize, String> {
    value.parse().map_err(|_| format!("error: invalid {flag} '{value}' (expected a positive integer)"))
}

/// `Title=text` or `Title[tag tag]=text`.
fn parse_passage(value: &str) -> Result<Passage, String> {
    let Some((head, text)) = value.split_once('=') else {
        return Err(format!("error: invalid --passage '{value}' (expected TITLE=TEXT)"));
    };
    let (title, tags) = match head.split_once('[') {
        Some((title, rest)) => (title, rest.trim_end_matches(']').split_whitespace().collect::<Vec<_>>()),
        None => (head, Vec::new()),
    };
    if title.trim().is_empty() {
        return Err(format!("error: invalid --passage '{value}' (empty title)"));
    }
    Ok(Passage::new(title.trim(), text).with_tags(&tags))
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "storymark {version}

Story markup wikifier CLI.

Usage:
  storymark [OPTIONS] [--] <markup...>
  storymark [OPTIONS] --input <markup>

Options:
  -i, --input <markup>       Markup to wikify. If omitted, reads remaining args
                             or stdin when no args are provided.
  -p, --passage <T=text>     Add a passage (repeatable). Tags: 'Title[tag tag]=text'.
  --nobr                     Suppress <br> for line breaks.
  --max-loop <n>             Iteration cap for <<for>>. Default: {max_loop}
  --max-depth <n>            Markup nesting cap. Default: {max_depth}
  --html                     Print only the generated HTML.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  {log_env}              tracing filter, e.g. storymark=debug

Exit codes:
  0  Success.
  1  Internal error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        max_loop = Config::default().max_loop_iterations,
        max_depth = Config::default().max_call_depth,
        log_env = LOG_ENV,
    )
}
