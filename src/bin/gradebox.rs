fn main() {
    match gradebox::cli::run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(gradebox::verdict::outcome::STATUS_OTHER);
        }
    }
}
