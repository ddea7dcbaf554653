/// Preview — generate sentences from a rule-definition file.
///
/// Usage: preview <rules.ron> [--seed <n>] [--count <n>] [--top <rule>]
///                [--max-depth <n>] [--trace] [--print]

use std::path::Path;
use std::process;
use tracing::Level;
use stochastic_grammar::core::rules::Rules;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let rules_path = &args[1];
    let mut seed: Option<u64> = None;
    let mut count: usize = 10;
    let mut top: Option<String> = None;
    let mut max_depth: Option<usize> = None;
    let mut trace = false;
    let mut print = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().ok();
            }
            "--count" if i + 1 < args.len() => {
                i += 1;
                count = args[i].parse().unwrap_or(10);
            }
            "--top" if i + 1 < args.len() => {
                i += 1;
                top = Some(args[i].clone());
            }
            "--max-depth" if i + 1 < args.len() => {
                i += 1;
                max_depth = args[i].parse().ok();
            }
            "--trace" => trace = true,
            "--print" => print = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    if trace {
        init_tracing();
    }

    let mut rules = match Rules::load_from_ron(Path::new(rules_path)) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("ERROR: Failed to load rules file: {}", e);
            process::exit(1);
        }
    };
    if let Some(seed) = seed {
        rules.seed(seed);
    }
    if let Some(ref top) = top {
        rules.set_top(top);
    }
    if let Some(depth) = max_depth {
        rules.max_depth = depth;
    }
    rules.trace = trace;

    println!("Loaded {} rules", rules.len());
    if let Some(seed) = seed {
        println!("Seed: {}", seed);
    }

    let errors = rules.validate();
    for error in &errors {
        println!("WARNING: {}", error);
    }

    if print {
        println!("{}", rules);
    }

    rules.init();
    println!();
    for n in 1..=count {
        match rules.gen_string() {
            Ok(sentence) => {
                println!("{:>3}. {}", n, sentence);
                if trace {
                    println!("     fired: {}", rules.fired().join(", "));
                }
            }
            Err(e) => {
                eprintln!("ERROR: generation failed: {}", e);
                process::exit(1);
            }
        }
    }
}

/// Print rule firing and selection diagnostics to stderr.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("Usage: preview <rules.ron> [options]");
    println!();
    println!("Options:");
    println!("  --seed <n>       RNG seed for reproducible output");
    println!("  --count <n>      number of sentences to generate (default 10)");
    println!("  --top <rule>     start expansion from this rule");
    println!("  --max-depth <n>  nested expansion limit");
    println!("  --trace          list the rules fired for each sentence");
    println!("  --print          print the rendered rules before generating");
}
