fn main() {
    if let Err(err) = sales_dashboard::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
