#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = lssctc_final_exams::run().await {
        eprintln!("lssctc-final-exams fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
