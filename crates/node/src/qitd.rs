fn main() {
    if let Err(err) = qitd::run_entry() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
