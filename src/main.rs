fn main() {
    if let Err(err) = friendly_timer::run() {
        eprintln!("friendly-timer: {err:#}");
        std::process::exit(1);
    }
}
