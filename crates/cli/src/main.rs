use std::process::ExitCode;

fn main() -> ExitCode {
    linedesk_cli::run()
}
