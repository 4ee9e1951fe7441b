use std::process::ExitCode;

fn main() -> ExitCode {
    handl_cli::run()
}
