fn main() -> std::process::ExitCode {
    chronosense_lib::run()
}
