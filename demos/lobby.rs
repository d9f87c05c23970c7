//! # Lobby demo
//!
//! Runs a host and a handful of guests on one in-process network, adds a few
//! bots, bounces a ball state around on an admin-scoped channel and then has
//! the host walk away.
//!
//! ```sh
//! cargo run --example lobby -- --guests 3 --bots 2
//! ```

use anyhow::Result;
use clap::Parser;
use p2p_game_room::{GameRoom, LocalNetwork, PeerId, RoomEvent, Session, WireFormat};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, rc::Rc};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of guests joining the host
    #[arg(short, long, default_value_t = 2)]
    guests: usize,
    /// Number of bots the host adds
    #[arg(short, long, default_value_t = 1)]
    bots: usize,
    /// Use postcard instead of JSON on the wire
    #[arg(long)]
    postcard: bool,
    /// Room to meet in
    #[arg(long, default_value = "lobby")]
    room: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ball {
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();
    let cli = Cli::parse();

    let network = LocalNetwork::new();
    let wire_format = if cli.postcard {
        WireFormat::Postcard
    } else {
        WireFormat::Json
    };
    let session = Session::default()
        .with_room(&cli.room)
        .with_wire_format(wire_format);

    let host = GameRoom::join(&network, session.clone().with_name("host"))?;
    let host_id = host
        .self_id()
        .ok_or_else(|| anyhow::anyhow!("host has no peer id"))?;
    host.on_peer_join(|peer| info!("host: {peer} joined"));
    host.on_peer_leave(|peer| info!("host: {peer} left"));

    let mut guests = Vec::new();
    for n in 0..cli.guests {
        let guest = GameRoom::join(
            &network,
            session
                .clone()
                .with_host(host_id.clone())
                .with_name(format!("guest-{n}")),
        )?;
        guest.on_connected(move || info!("guest-{n}: connected"));
        guest.on_disconnected(move || info!("guest-{n}: lost the host"));
        guests.push(guest);
    }
    network.run_until_idle();

    for _ in 0..cli.bots {
        host.add_bot("Botty")?;
    }
    network.run_until_idle();
    println!("roster: {}", host.known_player_info());

    // Every guest watches the ball, the host hears paddle input from everyone.
    let seen: Rc<RefCell<Vec<(String, PeerId)>>> = Default::default();
    for (n, guest) in guests.iter().enumerate() {
        let (_, ball) = guest.make_scoped_channel::<Ball>("ball")?;
        let seen = seen.clone();
        ball.on_receive(move |ball, sender| {
            seen.borrow_mut()
                .push((format!("guest-{n} saw ball at ({}, {})", ball.x, ball.y), sender));
        });
        let (paddle, _) = guest.make_scoped_channel::<f32>("paddle")?;
        paddle.send(&(n as f32 / 10.0), None)?;
    }
    let (_, paddles) = host.make_scoped_channel::<f32>("paddle")?;
    paddles.on_receive(|y, sender| info!("host: paddle of {sender} at {y}"));
    let (ball, _) = host.make_scoped_channel::<Ball>("ball")?;
    ball.send(
        &Ball {
            x: 0.5,
            y: 0.5,
            dx: 0.01,
            dy: -0.02,
        },
        None,
    )?;
    network.run_until_idle();
    for (line, sender) in seen.borrow().iter() {
        println!("{line} from {sender}");
    }

    let mut inbox = guests
        .first()
        .map(|guest| guest.subscribe())
        .ok_or_else(|| anyhow::anyhow!("run with at least one guest"))?;
    host.leave();
    network.run_until_idle();
    while let Ok(event) = inbox.try_recv() {
        match event {
            RoomEvent::Disconnected => println!("guest-0 is on its own now"),
            other => println!("guest-0: {other}"),
        }
    }
    Ok(())
}
