use std::path::PathBuf;

use keepalive_smtp::{KeepAlive, ServerEndpoint};
use structopt::StructOpt;
use tokio::io::{self, AsyncReadExt};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // Collect all inputs
    let opt = Opt::from_args();
    let endpoint = match opt.config {
        Some(ref path) => ServerEndpoint::load(path)?,
        None => ServerEndpoint::from_env()?,
    };

    println!("Type the HTML body and finish with Ctrl+D:");
    let mut body = String::new();
    io::stdin().read_to_string(&mut body).await?;

    let mailer = KeepAlive::new(&endpoint)?;
    mailer.start().await?;

    let sent = mailer.send(&opt.to, &opt.subject, &body).await;
    mailer.stop().await;

    if sent {
        println!("Email sent.");
        Ok(())
    } else {
        Err("could not send email, see the log for details".into())
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "send")]
struct Opt {
    /// Rcpt to
    #[structopt(short = "t", name = "recipient address")]
    to: String,

    /// Subject line
    #[structopt(short = "s", long, default_value = "")]
    subject: String,

    /// TOML file with the endpoint; the SMTP_* environment still overrides it
    #[structopt(short = "c", long, parse(from_os_str))]
    config: Option<PathBuf>,
}
