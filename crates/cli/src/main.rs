use std::process::ExitCode;

fn main() -> ExitCode {
    treadline_cli::run()
}
