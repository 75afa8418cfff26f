mod client;
mod config;
mod ingest;

use std::process::ExitCode;

use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "scurry", about = "multi-modal acquisition and ingest pipeline")]
enum Opt {
    /// Run the acquisition node: governors for sensors, cameras, microphone,
    /// aux channels and the speaker
    Client(client::ClientOpt),
    /// Run the receiver node: gateway, session pool and per-device consumers
    Ingest(ingest::IngestOpt),
}

fn main() -> Result<(), ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let result = match opt {
        Opt::Client(opt) => client::run(opt).map_err(|e| e.to_string()),
        Opt::Ingest(opt) => ingest::run(opt).map_err(|e| e.to_string()),
    };

    result.map_err(|err| {
        log::error!("fatal: {err}");
        ExitCode::FAILURE
    })
}
