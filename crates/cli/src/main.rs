use std::process::ExitCode;

fn main() -> ExitCode {
    trusty_cli::run()
}
