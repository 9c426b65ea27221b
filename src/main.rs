//! snap – command-line HTML snapshot capturer.
//!
//! Usage:
//!   snap <input.html> [output] [--selector SEL] [--exclude SEL]... [--no-compress]
//!        [--pseudo] [--svg] [--manifest manifest.json] [--config config.json]
//!
//! If `output` is omitted the snapshot is written next to the input file with
//! the same stem (e.g. `report.html` → `report.snap.html`, or `.svg`).

use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
};

use snap_forge::pipeline::{capture_html, CaptureConfig};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut manifest_path: Option<PathBuf> = None;
    let mut selector: Option<String> = None;
    let mut exclude: Vec<String> = Vec::new();
    let mut no_compress = false;
    let mut pseudo = false;
    let mut svg = false;
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--selector" | "-s" => selector = Some(flag_value(&mut iter, arg, &args[0])),
            "--exclude" | "-x" => exclude.push(flag_value(&mut iter, arg, &args[0])),
            "--config" | "-c" => config_path = Some(PathBuf::from(flag_value(&mut iter, arg, &args[0]))),
            "--manifest" | "-m" => {
                manifest_path = Some(PathBuf::from(flag_value(&mut iter, arg, &args[0])))
            }
            "--no-compress" => no_compress = true,
            "--pseudo" => pseudo = true,
            "--svg" => svg = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    input_path = Some(PathBuf::from(path));
                } else if positional == 1 {
                    output_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    // Config file first, then flags on top.
    let mut config = match config_path {
        Some(path) => {
            let json = read_or_exit(&path);
            match CaptureConfig::from_json(&json) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error in config '{}': {e}", path.display());
                    process::exit(1);
                }
            }
        }
        None => CaptureConfig::default(),
    };
    if let Some(sel) = selector {
        config.selector = sel;
    }
    config.exclude.extend(exclude);
    if no_compress {
        config.compress = false;
    }
    if pseudo {
        config.capture_pseudo = true;
    }

    // Default output: same directory + same stem as input.
    let output = output_path.unwrap_or_else(|| {
        let mut o = input.clone();
        o.set_extension(if svg { "snap.svg" } else { "snap.html" });
        o
    });

    let html = read_or_exit(&input);

    let snapshot = match capture_html(&html, &config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error capturing '{}': {e}", input.display());
            process::exit(1);
        }
    };

    let markup = if svg {
        snapshot.to_svg_auto()
    } else {
        snapshot.to_html()
    };
    write_or_exit(&output, &markup);

    if let Some(path) = manifest_path {
        write_or_exit(&path, &snapshot.manifest().to_json());
    }

    let classes = snapshot.classes.len();
    eprintln!(
        "Wrote '{}' ({} bytes, {} class{})",
        output.display(),
        markup.len(),
        classes,
        if classes == 1 { "" } else { "es" }
    );
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> String {
    match iter.next() {
        Some(v) => v.clone(),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn read_or_exit(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", path.display());
            process::exit(1);
        }
    }
}

fn write_or_exit(path: &Path, contents: &str) {
    // Create output directory if necessary.
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating output directory: {e}");
                process::exit(1);
            }
        }
    }
    if let Err(e) = fs::write(path, contents) {
        eprintln!("Error writing '{}': {e}", path.display());
        process::exit(1);
    }
}

fn print_usage(prog: &str) {
    eprintln!("snap – HTML snapshot capturer (snap-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input.html> [output] [flags]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input.html>   HTML file to capture");
    eprintln!("  [output]       Output path  (default: <stem>.snap.html, or .snap.svg with --svg)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --selector, -s SEL   Capture root (default: body)");
    eprintln!("  --exclude, -x SEL    Replace matches with spacers (repeatable)");
    eprintln!("  --no-compress        Keep declarations equal to tag defaults");
    eprintln!("  --pseudo             Capture ::before / ::after content");
    eprintln!("  --svg                Write an SVG foreignObject instead of HTML");
    eprintln!("  --manifest, -m PATH  Also write a JSON capture manifest");
    eprintln!("  --config, -c PATH    Load a JSON capture config (flags override it)");
    eprintln!("  --help               Print this message");
}
