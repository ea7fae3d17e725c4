use std::fs;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use phrasal::{RawGrammar, StateMap};
use serde_json::Value;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// The input as rewritten by every rule
    Text,
    /// The root's working text with tokens replaced by each rule's modified text
    Unmasked,
    /// The whole match tree
    Json,
}

#[derive(Parser)]
#[command(name = "phrasal-cli")]
#[command(about = "Runs a JSON grammar over some text")]
struct Args {
    /// Path to the JSON grammar
    grammar: PathBuf,
    /// Text to parse, read from --input-file if missing
    input: Option<String>,
    #[arg(long)]
    input_file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Start the parse from this rule instead of the grammar's root
    #[arg(long)]
    rule: Option<String>,
    /// Seeds the global state, `key=value`. Values are parsed as JSON, falling back to strings
    #[arg(long = "seed", value_parser = parse_seed)]
    seeds: Vec<(String, Value)>,
}

fn parse_seed(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let input = match (args.input, args.input_file) {
        (Some(input), _) => input,
        (None, Some(path)) => fs::read_to_string(path)?,
        (None, None) => return Err("either an input or --input-file is required".into()),
    };

    let registry = RawGrammar::load_from_file(&args.grammar)?.compile()?;
    let mut seed = StateMap::new();
    for (key, value) in args.seeds {
        seed.put(key, value);
    }

    let tree = match &args.rule {
        Some(rule) => registry.parse_from(rule, &input, seed)?,
        None => registry.parse_with_state(&input, seed)?,
    };

    match args.format {
        Format::Text => println!("{}", tree.render()),
        Format::Unmasked => println!("{}", tree.unmask(tree.root().working_text())),
        Format::Json => println!("{}", serde_json::to_string_pretty(&tree)?),
    }

    Ok(())
}
