use survey_runtime_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("survey-runtime: {err}");
        std::process::exit(i32::from(err.exit_code()));
    }
}
