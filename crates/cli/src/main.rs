fn main() -> std::process::ExitCode {
    actiongate_cli::run()
}
