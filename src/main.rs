#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let code = fibermirror::cli::run_with_args(&args).await;
    std::process::exit(code);
}
