use std::{env, fs, io::Read, process::ExitCode};

use islet::Runner;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let source = match args.get(1) {
        Some(path) => match read_file(path) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => match read_stdin() {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
    };

    let mut runner = Runner::new();
    print!("{}", runner.run_str(&source));
    ExitCode::SUCCESS
}

fn read_file(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("error reading {path}: {err}"))
}

fn read_stdin() -> Result<String, String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|err| format!("error reading stdin: {err}"))?;
    Ok(buf)
}
