fn main() {
    if let Err(e) = synthchat_lib::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
