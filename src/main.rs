fn main() {
    if let Err(err) = hxl_population::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
