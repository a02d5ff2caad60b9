fn main() {
    let args = std::env::args();

    if let Err(err) = rawbak::run(args) {
        eprintln!(
            "{}",
            rawbak::logging::failure_line(&err, chrono::Local::now())
        );
        std::process::exit(rawbak::exit_code(&err));
    }
}
