fn main() {
    if let Err(e) = dosekeep_lib::run() {
        eprintln!("dosekeep: {e}");
        std::process::exit(1);
    }
}
