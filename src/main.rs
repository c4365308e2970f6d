#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    invoice_render_server::run().await
}
