fn main() -> std::process::ExitCode {
    technicia_lib::run()
}
