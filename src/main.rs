fn main() {
    if let Err(err) = quotaboard_lib::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
