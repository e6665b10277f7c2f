use plugaudit_app::{init_tracing, run, Invocation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let invocation = Invocation::parse(std::env::args().skip(1))?;
    let code = run(invocation).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
