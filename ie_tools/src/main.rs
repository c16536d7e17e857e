use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use ie_board::holders::{fetch_mint_info, to_ui_amount};
use ie_board::SolanaRpc;
use ie_tools::config::{ToolsConfig, WALLET_SECRET_VAR};
use ie_tools::media::{
    content_type_for_path, load_frames, preview_first_frame, save_frames, validate_path,
    FilterParams, PixelFrame, RenderLoop, Watermark,
};
use ie_tools::swap::{parse_sol_amount, CONFIRM_TIMEOUT, SOL_DECIMALS};
use ie_tools::{
    select_wallet, ArweaveUploader, ArweaveWallet, HttpUploader, Progress, SwapClient, UploadFile, Uploader,
};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn cli() -> Command {
    Command::new("ie_tools")
        .version("0.1.0")
        .about("Swap, filter and upload tools for the $IE community")
        .subcommand_required(true)
        .subcommand(
            Command::new("quote")
                .about("Estimates the $IE received for an amount of SOL")
                .arg(Arg::new("amount").short('a').long("amount").value_name("SOL").required(true)),
        )
        .subcommand(
            Command::new("swap")
                .about("Buys $IE with SOL")
                .arg(Arg::new("amount").short('a').long("amount").value_name("SOL").required(true))
                .arg(
                    Arg::new("wallet")
                        .short('w')
                        .long("wallet")
                        .value_parser(["keypair", "env"]),
                ),
        )
        .subcommand(
            Command::new("filter")
                .about("Applies the $IE filter to an image or GIF")
                .arg(Arg::new("input").short('i').long("input").value_parser(value_parser!(PathBuf)).required(true))
                .arg(Arg::new("output").short('o').long("output").value_parser(value_parser!(PathBuf)).required(true))
                .arg(Arg::new("watermark").long("watermark").value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("seed").long("seed").value_parser(value_parser!(u64))),
        )
        .subcommand(
            Command::new("preview")
                .about("Filters only the first frame")
                .arg(Arg::new("input").short('i').long("input").value_parser(value_parser!(PathBuf)).required(true))
                .arg(Arg::new("output").short('o').long("output").value_parser(value_parser!(PathBuf)).required(true)),
        )
        .subcommand(
            Command::new("upload")
                .about("Uploads media to permanent storage or an HTTP pinning endpoint")
                .arg(Arg::new("file").short('f').long("file").value_parser(value_parser!(PathBuf)).required(true))
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .value_parser(["arweave", "http"])
                        .default_value("arweave"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("quote", args)) => quote(args).await,
        Some(("swap", args)) => swap(args).await,
        Some(("filter", args)) => filter(args).await,
        Some(("preview", args)) => preview(args),
        Some(("upload", args)) => upload(args).await,
        _ => Err(anyhow!("unknown command")),
    }
}

fn required<'a, T: Clone + Send + Sync + 'static>(args: &'a ArgMatches, name: &str) -> Result<&'a T> {
    args.get_one::<T>(name).ok_or_else(|| anyhow!("--{} is required", name))
}

async fn quote(args: &ArgMatches) -> Result<()> {
    let config = ToolsConfig::from_env()?;
    let amount = parse_sol_amount(required::<String>(args, "amount")?)?;
    if amount == 0 {
        return Err(anyhow!("amount must be greater than zero"));
    }

    let rpc = SolanaRpc::new(config.rpc_url.clone());
    let mint = fetch_mint_info(&rpc, &config.mint).await?;
    let client = SwapClient::new(&config.jupiter_api, config.mint).with_api_key(config.jupiter_api_key.clone());
    let quote = client.get_quote(amount).await?;

    println!(
        "{} SOL -> {} $IE (at least {}), price impact {:.4}%, route {}",
        to_ui_amount(quote.in_amount, SOL_DECIMALS),
        to_ui_amount(quote.out_amount, mint.decimals),
        to_ui_amount(quote.other_amount_threshold, mint.decimals),
        quote.price_impact_pct * 100.0,
        quote.route.join(" > ")
    );
    Ok(())
}

async fn swap(args: &ArgMatches) -> Result<()> {
    let config = ToolsConfig::from_env()?;
    let amount = parse_sol_amount(required::<String>(args, "amount")?)?;
    if amount == 0 {
        return Err(anyhow!("amount must be greater than zero"));
    }

    let kind = args.get_one::<String>("wallet").unwrap_or(&config.wallet_kind);
    let mut wallet = select_wallet(kind, &config.keypair_path, WALLET_SECRET_VAR)?;
    let user = wallet.connect()?;
    info!("swapping {} lamports from {} ({})", amount, user, wallet.name());

    let rpc = SolanaRpc::new(config.rpc_url.clone());
    let client = SwapClient::new(&config.jupiter_api, config.mint).with_api_key(config.jupiter_api_key.clone());
    let quote = client.get_quote(amount).await?;
    let signature = client.execute_swap(&rpc, &quote, wallet.as_ref(), CONFIRM_TIMEOUT).await?;

    println!("confirmed: https://solscan.io/tx/{}", signature);
    Ok(())
}

fn read_validated(path: &Path) -> Result<(Vec<u8>, &'static str)> {
    let (_, content_type) = validate_path(path)?;
    Ok((std::fs::read(path)?, content_type))
}

fn load_watermark(path: &Path) -> Result<Watermark> {
    let (bytes, _) = read_validated(path)?;
    let image = image::load_from_memory(&bytes)?;
    Ok(Watermark {
        frame: PixelFrame::from(image.to_rgba8()),
        opacity: 0.6,
        margin: 8,
    })
}

async fn filter(args: &ArgMatches) -> Result<()> {
    let input = required::<PathBuf>(args, "input")?;
    let output = required::<PathBuf>(args, "output")?;
    if content_type_for_path(output).is_none() {
        return Err(anyhow!("unsupported output file: {}", output.display()));
    }

    let mut params = FilterParams::default();
    if let Some(seed) = args.get_one::<u64>("seed") {
        params.seed = *seed;
    }
    if let Some(path) = args.get_one::<PathBuf>("watermark") {
        params.watermark = Some(load_watermark(path)?);
    }

    let (bytes, content_type) = read_validated(input)?;
    let source = load_frames(&bytes, content_type)?;
    let mut handle = RenderLoop::spawn(source, params);
    let mut frames = Vec::new();
    while let Some(frame) = handle.next().await {
        frames.push(frame);
    }
    handle.finish().await;

    info!("filtered {} frame(s) from {}", frames.len(), input.display());
    save_frames(output, frames)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn preview(args: &ArgMatches) -> Result<()> {
    let input = required::<PathBuf>(args, "input")?;
    let output = required::<PathBuf>(args, "output")?;

    let (bytes, content_type) = read_validated(input)?;
    let mut source = load_frames(&bytes, content_type)?;
    let frame = preview_first_frame(&mut source, &FilterParams::default())?;
    save_frames(output, vec![frame])?;
    println!("wrote {}", output.display());
    Ok(())
}

async fn upload(args: &ArgMatches) -> Result<()> {
    let config = ToolsConfig::from_env()?;
    let path = required::<PathBuf>(args, "file")?;
    let file = UploadFile::from_path(path)?;

    let uploader: Box<dyn Uploader> = match required::<String>(args, "target")?.as_str() {
        "http" => {
            let endpoint = config
                .upload_endpoint
                .clone()
                .ok_or_else(|| anyhow!("UPLOAD_ENDPOINT must be set for http uploads"))?;
            Box::new(HttpUploader::new(endpoint).with_token(config.upload_token.clone()))
        }
        _ => {
            let wallet = ArweaveWallet::from_file(Path::new(&config.arweave_wallet))?;
            info!("paying for storage from {}", wallet.address());
            Box::new(ArweaveUploader::new(&config.arweave_gateway, Arc::new(wallet)))
        }
    };

    info!("uploading {} bytes to {:?}", file.len(), uploader.target());
    let progress = Progress::new(|percent| eprint!("\ruploading... {:>3}%", percent));
    let address = uploader.upload(&file, &progress).await;
    eprintln!();
    let address = address?;

    println!("{}", serde_json::to_string_pretty(&address)?);
    Ok(())
}
