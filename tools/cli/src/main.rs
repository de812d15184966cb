//! Sable CLI - demo driver for the engine boundary contract.
//!
//! Each subcommand runs the full lifecycle (initialize, unlock, subscribe,
//! background refresh, readiness) against the in-memory reference engine
//! and then exercises one surface: encrypted volumes, network shares, or
//! echo messaging.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sable_common::{Credential, ShareId, StorePath};
use sable_driver::{DriverConfig, LifecycleDriver, Startup, VolumeSpec};
use sable_engine::{
    Contact, Engine, MemoryEngine, MessageHub, MountPoint, NetworkShare, SecureSession, Volume,
    VolumeKind,
};
use sable_store::{BlobRead, BlobWrite, FileReader, FileWriter, LocalStore, PersistentStore, ReadOutcome};

/// Message kind used by the echo demo.
const ECHO_KIND: &str = "app.echo";

/// Poll interval while waiting for an echo reply.
const ECHO_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bounded number of reply polls per message.
const ECHO_MAX_POLLS: u32 = 100;

/// Bound on a session read while waiting for an echo reply.
const SESSION_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on an inbound session read before the server gives up on a peer.
const INBOUND_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "sable")]
#[command(about = "Sable - secure engine demos")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Private keystore directory for engine data.
    #[arg(long, default_value = ".SaifeStore")]
    keystore: PathBuf,

    /// Unlock credential. Prompted for when omitted.
    #[arg(long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file into an encrypted volume and read it back out.
    Dar {
        /// Input file to store.
        #[arg(short, long)]
        file: PathBuf,

        /// Where to write the retrieved copy.
        #[arg(short, long)]
        output: PathBuf,

        /// Volume label.
        #[arg(long, default_value = "demo-volume")]
        label: String,

        /// Backing file for the volume container.
        #[arg(long, default_value = "black_data.bin")]
        backing: PathBuf,

        /// Volume capacity in bytes.
        #[arg(long, default_value_t = 10 * 1024 * 1024)]
        size: u64,

        /// Remove and recreate the volume first.
        #[arg(short, long)]
        recreate: bool,

        /// Mount-point slot (1-9).
        #[arg(long, default_value_t = 1)]
        slot: u8,
    },

    /// Encrypt a file into a network share and decrypt it back.
    Share {
        /// Input file to store.
        #[arg(short, long)]
        file: PathBuf,

        /// Where to write the decrypted copy.
        #[arg(short, long)]
        output: PathBuf,

        /// Backing directory for encrypted objects.
        #[arg(long, default_value = "black_data")]
        store_root: PathBuf,

        /// Share identifier.
        #[arg(long, default_value = "demo-share")]
        share_id: String,

        /// Object name in the share (defaults to the input file name).
        #[arg(long)]
        object: Option<String>,
    },

    /// Run an in-process echo client and server pair.
    Echo {
        /// Exercise a secure session instead of store-and-forward
        /// messages.
        #[arg(long)]
        session: bool,

        /// Messages to send and expect back.
        #[arg(required = true)]
        messages: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let credential = match &cli.password {
        Some(password) => Credential::from_str(password),
        None => prompt_credential("Enter credential: ")?,
    };

    match cli.command {
        Commands::Dar {
            file,
            output,
            label,
            backing,
            size,
            recreate,
            slot,
        } => {
            cmd_dar(
                &cli.keystore,
                &credential,
                &file,
                &output,
                &label,
                &backing,
                size,
                recreate,
                slot,
            )
            .await
        }

        Commands::Share {
            file,
            output,
            store_root,
            share_id,
            object,
        } => {
            cmd_share(
                &cli.keystore,
                &credential,
                &file,
                &output,
                &store_root,
                &share_id,
                object,
            )
            .await
        }

        Commands::Echo { session, messages } => {
            cmd_echo(&cli.keystore, &credential, session, &messages).await
        }
    }
}

/// Prompt for the credential securely.
fn prompt_credential(prompt: &str) -> Result<Credential> {
    let password = rpassword::prompt_password(prompt).context("Failed to read credential")?;
    Ok(Credential::from_str(&password))
}

/// Drive a freshly built engine to the unlocked, subscribed, refreshed
/// state. Returns None when the engine needs out-of-band provisioning.
async fn bring_up(
    engine: Arc<dyn Engine>,
    keystore: &PathBuf,
    credential: &Credential,
) -> Result<Option<LifecycleDriver>> {
    let config = DriverConfig {
        keystore: keystore.clone(),
        identity: "sable-demo".to_string(),
        capabilities: vec!["app.echo".to_string(), "app.share".to_string()],
        ..Default::default()
    };
    let mut driver = LifecycleDriver::new(engine, config);

    match driver.start(credential).await? {
        Startup::NeedsProvisioning { artifact } => {
            println!(
                "Provisioning request written to {}. Provision it and restart.",
                artifact.display()
            );
            Ok(None)
        }
        Startup::Ready => {
            driver.unlock(credential).await.context("Failed to unlock")?;
            driver.subscribe().await.context("Failed to subscribe")?;
            driver.spawn_refresh();
            driver
                .ready()
                .await
                .context("Engine data refresh did not complete")?;
            Ok(Some(driver))
        }
    }
}

/// Pump bytes between two blob streams in fixed-size blocks.
async fn copy_stream(src: &mut dyn BlobRead, dst: &mut dyn BlobWrite) -> Result<u64> {
    let mut buf = [0u8; 1024];
    let mut total = 0u64;
    while let ReadOutcome::Data(n) = src.read(&mut buf).await? {
        dst.write(&buf[..n]).await?;
        total += n as u64;
    }
    Ok(total)
}

/// Store a file into a mounted volume and retrieve it back out.
#[allow(clippy::too_many_arguments)]
async fn cmd_dar(
    keystore: &PathBuf,
    credential: &Credential,
    file: &PathBuf,
    output: &PathBuf,
    label: &str,
    backing: &PathBuf,
    size: u64,
    recreate: bool,
    slot: u8,
) -> Result<()> {
    let engine: Arc<dyn Engine> = Arc::new(
        MemoryEngine::builder()
            .alias("dar-demo")
            .credential_bytes(credential.as_bytes())
            .build(),
    );
    let Some(mut driver) = bring_up(engine, keystore, credential).await? else {
        return Ok(());
    };

    let spec = VolumeSpec {
        label: label.to_string(),
        backing: backing.clone(),
        kind: VolumeKind::Permanent,
        size,
        mount_point: MountPoint::new(slot).context("Invalid mount slot")?,
        recreate,
    };
    let volume = driver
        .ensure_volume(&spec)
        .await
        .context("Failed to prepare volume")?;
    info!("volume '{}' mounted", volume.label());

    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("Input file has no usable name")?;
    let entry = StorePath::root().join(name).context("Invalid entry name")?;

    // Store into the volume namespace.
    let mut src = FileReader::open(file)
        .await
        .context("Failed to open input file")?;
    let mut dst = volume.open_write(&entry).await?;
    let stored = copy_stream(&mut src, dst.as_mut()).await?;
    dst.close().await?;
    src.close().await?;
    println!("Stored {} bytes as {}", stored, entry);

    // Retrieve it back out.
    let mut src = volume.open_read(&entry).await?;
    let mut dst = FileWriter::create(output)
        .await
        .context("Failed to create output file")?;
    let retrieved = copy_stream(src.as_mut(), &mut dst).await?;
    dst.close().await?;
    src.close().await?;
    println!("Retrieved {} bytes to {}", retrieved, output.display());

    let original = tokio::fs::read(file).await?;
    let roundtrip = tokio::fs::read(output).await?;
    anyhow::ensure!(original == roundtrip, "Round trip does not match input");
    println!("Round trip verified ({} bytes).", original.len());

    driver.shutdown().await;
    Ok(())
}

/// Encrypt a file into a network share and decrypt it back.
async fn cmd_share(
    keystore: &PathBuf,
    credential: &Credential,
    file: &PathBuf,
    output: &PathBuf,
    store_root: &PathBuf,
    share_id: &str,
    object: Option<String>,
) -> Result<()> {
    let engine: Arc<dyn Engine> = Arc::new(
        MemoryEngine::builder()
            .alias("share-demo")
            .credential_bytes(credential.as_bytes())
            .build(),
    );
    let Some(mut driver) = bring_up(engine, keystore, credential).await? else {
        return Ok(());
    };

    let store: Arc<dyn PersistentStore> =
        Arc::new(LocalStore::new(store_root).context("Failed to open backing store")?);
    let id = ShareId::new(share_id).context("Invalid share id")?;
    let bucket = StorePath::root();

    let share = driver
        .open_or_create_share(&id, &bucket, store.clone())
        .await
        .context("Failed to open or create share")?;

    let object = match object {
        Some(name) => name,
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .context("Input file has no usable name")?
            .to_string(),
    };

    // Encrypt into the backing store.
    let sink = store.open_write(&bucket, &object).await?;
    let mut enc = share.encrypt_stream(sink).await?;
    let mut src = FileReader::open(file)
        .await
        .context("Failed to open input file")?;
    let stored = copy_stream(&mut src, enc.as_mut()).await?;
    enc.close().await?;
    src.close().await?;
    println!("Encrypted {} bytes into object '{}'", stored, object);

    let objects = store.list_objects(&bucket, "").await?;
    println!("Objects in store:");
    for obj in &objects {
        println!("  {}", obj.name());
    }

    // Decrypt back out.
    let source = store.open_read(&bucket, &object).await?;
    let mut dec = share.decrypt_stream(source).await?;
    let mut dst = FileWriter::create(output)
        .await
        .context("Failed to create output file")?;
    let retrieved = copy_stream(dec.as_mut(), &mut dst).await?;
    dst.close().await?;
    println!("Decrypted {} bytes to {}", retrieved, output.display());

    driver.shutdown().await;
    Ok(())
}

/// Run an echo server and client over a shared in-process hub.
async fn cmd_echo(
    keystore: &PathBuf,
    credential: &Credential,
    session: bool,
    messages: &[String],
) -> Result<()> {
    let hub = Arc::new(MessageHub::new());

    let server = Arc::new(
        MemoryEngine::builder()
            .alias("echo-server")
            .credential_bytes(credential.as_bytes())
            .hub(hub.clone())
            .build(),
    );
    let client = Arc::new(
        MemoryEngine::builder()
            .alias("echo-client")
            .credential_bytes(credential.as_bytes())
            .hub(hub)
            .build(),
    );
    server.add_contact(client.identity().clone());
    client.add_contact(server.identity().clone());

    let Some(mut server_driver) =
        bring_up(server.clone() as Arc<dyn Engine>, keystore, credential).await?
    else {
        return Ok(());
    };
    let Some(mut client_driver) =
        bring_up(client.clone() as Arc<dyn Engine>, keystore, credential).await?
    else {
        return Ok(());
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let server_task = if session {
        tokio::spawn(run_session_server(server.clone(), stop_rx))
    } else {
        tokio::spawn(run_message_server(server.clone(), stop_rx))
    };

    let peer = client
        .contact_by_alias("echo-server")
        .await
        .context("Server contact missing")?;

    let received = if session {
        run_session_client(&client, &peer, messages).await?
    } else {
        run_message_client(&client, &peer, messages).await?
    };

    println!(
        "All done. Sent {} messages and received {} echoes.",
        messages.len(),
        received
    );

    let _ = stop_tx.send(true);
    let _ = server_task.await;
    server_driver.shutdown().await;
    client_driver.shutdown().await;

    anyhow::ensure!(
        received == messages.len(),
        "Missed {} echo(es)",
        messages.len() - received
    );
    Ok(())
}

/// Echo every inbound message back to its sender until stopped.
async fn run_message_server(engine: Arc<MemoryEngine>, mut stop: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = tokio::time::sleep(ECHO_POLL_INTERVAL) => {
                let inbound = match engine.fetch_messages(ECHO_KIND).await {
                    Ok(msgs) => msgs,
                    Err(e) => {
                        tracing::warn!("fetch failed: {}", e);
                        continue;
                    }
                };
                for msg in inbound {
                    info!("echoing {} bytes back to '{}'", msg.body.len(), msg.sender.alias);
                    if let Err(e) = engine.send_message(&msg.sender, &msg.kind, msg.body).await {
                        tracing::warn!("echo send failed: {}", e);
                    }
                }
            }
        }
    }
}

/// Send each message and poll for its echo with a bounded retry budget.
async fn run_message_client(
    engine: &MemoryEngine,
    peer: &Contact,
    messages: &[String],
) -> Result<usize> {
    let mut received = 0usize;

    for message in messages {
        engine
            .send_message(peer, ECHO_KIND, message.clone().into_bytes())
            .await
            .context("Failed to send message")?;
        println!("> {}", message);

        let mut polls = 0u32;
        loop {
            tokio::time::sleep(ECHO_POLL_INTERVAL).await;
            let inbound = engine.fetch_messages(ECHO_KIND).await?;
            if !inbound.is_empty() {
                for msg in inbound {
                    println!("< {}", String::from_utf8_lossy(&msg.body));
                    received += 1;
                }
                break;
            }
            polls += 1;
            if polls >= ECHO_MAX_POLLS {
                println!("No echo for '{}' in time. Moving on.", message);
                break;
            }
        }
    }

    Ok(received)
}

/// Accept inbound sessions and echo their data until stopped.
async fn run_session_server(engine: Arc<MemoryEngine>, mut stop: watch::Receiver<bool>) {
    loop {
        let session = tokio::select! {
            _ = stop.changed() => break,
            accepted = engine.accept_session() => match accepted {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            },
        };

        info!("'{}' connected", session.peer().alias);
        tokio::spawn(handle_session(session));
    }
}

/// Echo session data back until the peer goes quiet or disconnects.
async fn handle_session(session: Box<dyn SecureSession>) {
    loop {
        match session.read(1024, INBOUND_READ_TIMEOUT).await {
            Ok(data) => {
                if let Err(e) = session.write(&data).await {
                    tracing::warn!("session write failed: {}", e);
                    break;
                }
            }
            Err(e) => {
                info!("closing session with '{}': {}", session.peer().alias, e);
                break;
            }
        }
    }
    let _ = session.close().await;
}

/// Connect a session, write each message, and read the echoes back.
async fn run_session_client(
    engine: &MemoryEngine,
    peer: &Contact,
    messages: &[String],
) -> Result<usize> {
    let session = engine
        .connect_session(peer, SESSION_READ_TIMEOUT)
        .await
        .context("Failed to connect session")?;

    let mut received = 0usize;
    for message in messages {
        session
            .write(message.as_bytes())
            .await
            .context("Failed to write to session")?;
        println!("> {}", message);

        match session.read(1024, SESSION_READ_TIMEOUT).await {
            Ok(data) => {
                println!("< {}", String::from_utf8_lossy(&data));
                received += 1;
            }
            Err(e) if matches!(e, sable_common::Error::Timeout(_)) => {
                println!("Missed an echo response. No big deal.");
            }
            Err(e) => return Err(e).context("Session read failed"),
        }
    }

    session.close().await.ok();
    Ok(received)
}
