//! Standalone multi-process demonstration tool: one process per party,
//! connected over real TCP sockets, running one of a couple of
//! primitive fronctocols end to end.
//!
//! Invocation mirrors the identity-list command-line form: this party's
//! own identity, followed by one `<peer-identity> <peer-address>
//! <peer-port>` triple per participant (including this one, so every
//! process can find its own listen address in the same list).
//!
//! ```text
//! fronctocol_tool --protocol multiply alice \
//!     alice 127.0.0.1 9000 bob 127.0.0.1 9001 carol 127.0.0.1 9002
//! ```

use clap::{Parser, ValueEnum};
use comfy_table::Table;
use fronctocol::engine::{Engine, Fronctocol};
use fronctocol::ff::{Field, Fp32BitPrime};
use fronctocol::helpers::mesh::Mesh;
use fronctocol::helpers::tcp::TcpNetwork;
use fronctocol::peers::PeerSet;
use fronctocol::protocol::multiply::{self, Multiply};
use fronctocol::protocol::reveal::{self, Reveal};
use fronctocol::randomness::kinds::{BeaverInfo, BeaverTriple, RandomnessInfo};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Instant;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Protocol {
    /// Every party reveals its own demo secret; the promised result is
    /// the sum of everyone's secret.
    Reveal,
    /// Every party multiplies a fixed pair of demo shares under a
    /// triple all parties derive identically (see `demo_multiply_shares`).
    Multiply,
}

#[derive(Parser, Debug)]
#[command(name = "fronctocol_tool", about = "Runs a fronctocol across real TCP connections")]
struct Cli {
    /// Which sub-protocol to demonstrate.
    #[arg(long, value_enum, default_value = "multiply")]
    protocol: Protocol,

    /// TOML party configuration (see `fronctocol::config::PartyConfig`);
    /// replaces the positional identity and peer list when given.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// This process's own identity; must also appear in `peers`.
    #[arg(required_unless_present = "config")]
    my_identity: Option<String>,

    /// Repeated `<identity> <address> <port>` triples, one per
    /// participant including this process.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    peers: Vec<String>,
}

/// Exit codes match the identity command-line form: 0 success, 1 usage
/// error, 2 malformed address, 3 engine abort, 4 transport failure.
const EXIT_USAGE: u8 = 1;
const EXIT_MALFORMED_ADDRESS: u8 = 2;
const EXIT_ABORTED: u8 = 3;
const EXIT_TRANSPORT: u8 = 4;

fn parse_addresses(triples: &[String]) -> Result<HashMap<String, SocketAddr>, (u8, String)> {
    if triples.len() % 3 != 0 || triples.is_empty() {
        return Err((
            EXIT_USAGE,
            "expected one or more <identity> <address> <port> triples".to_string(),
        ));
    }
    let mut out = HashMap::new();
    for chunk in triples.chunks(3) {
        let [identity, host, port] = chunk else {
            unreachable!("chunks(3) on a length divisible by 3");
        };
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| (EXIT_MALFORMED_ADDRESS, format!("{host}:{port}: {e}")))?;
        if out.insert(identity.clone(), addr).is_some() {
            return Err((EXIT_USAGE, format!("duplicate identity {identity} in peer list")));
        }
    }
    Ok(out)
}

fn split_additive_demo(rng: &mut StdRng, total: Fp32BitPrime, n: usize) -> Vec<Fp32BitPrime> {
    let mut shares = Vec::with_capacity(n);
    let mut running = Fp32BitPrime::ZERO;
    for _ in 0..n - 1 {
        let s = Fp32BitPrime::random(rng);
        running += s;
        shares.push(s);
    }
    shares.push(total - running);
    shares
}

/// Derives this party's share of the demo multiplication `3 * 5` by
/// seeding a deterministic RNG from the full (public) sorted identity
/// list and dealing locally: every process computes the identical
/// triple and operand shares and each just keeps its own slot. This is
/// a coordination device for this demo binary only — real randomness
/// must come from a dealer [`fronctocol::randomness::dealer::House`]
/// neither party can predict, which would require a dedicated
/// non-computing dealer process outside this tool's simple
/// identity-list argument form.
fn demo_multiply_shares(
    sorted_identities: &[String],
    me: &str,
) -> (Fp32BitPrime, Fp32BitPrime, BeaverTriple<Fp32BitPrime>) {
    let mut hasher = DefaultHasher::new();
    for id in sorted_identities {
        id.hash(&mut hasher);
    }
    let mut rng = StdRng::seed_from_u64(hasher.finish());
    let n = sorted_identities.len();
    let triple_shares = BeaverInfo::<Fp32BitPrime>::new().generate(&mut rng, n);
    let x_shares = split_additive_demo(&mut rng, Fp32BitPrime::from_u128(3), n);
    let y_shares = split_additive_demo(&mut rng, Fp32BitPrime::from_u128(5), n);
    let index = sorted_identities
        .iter()
        .position(|id| id == me)
        .expect("me is always in sorted_identities");
    (x_shares[index], y_shares[index], triple_shares[index])
}

async fn run(cli: Cli) -> Result<ExitCode, (u8, String)> {
    let (my_identity, addresses) = match &cli.config {
        Some(path) => {
            let cfg = fronctocol::config::PartyConfig::load(path)
                .map_err(|e| (EXIT_USAGE, e.to_string()))?;
            (cfg.me.clone(), cfg.peers)
        }
        None => (
            cli.my_identity.clone().ok_or_else(|| {
                (EXIT_USAGE, "an identity or --config is required".to_string())
            })?,
            parse_addresses(&cli.peers)?,
        ),
    };
    let my_addr = *addresses
        .get(&my_identity)
        .ok_or_else(|| (EXIT_USAGE, format!("{my_identity} is not among the listed peers")))?;

    let listener = tokio::net::TcpListener::bind(my_addr)
        .await
        .map_err(|e| (EXIT_MALFORMED_ADDRESS, format!("binding {my_addr}: {e}")))?;

    let net = TcpNetwork::connect(my_identity.clone(), listener, addresses.clone())
        .await
        .map_err(|e| (EXIT_TRANSPORT, e.to_string()))?;

    let mut sorted_identities: Vec<String> = addresses.keys().cloned().collect();
    sorted_identities.sort();
    let peers = PeerSet::from_identities(sorted_identities.clone());

    // The lexicographically smallest identity doubles as the revealer,
    // the same deterministic choice every process makes.
    let revealer = sorted_identities[0].clone();
    let root: Box<dyn Fronctocol<String>> = match cli.protocol {
        Protocol::Reveal => {
            let share = Fp32BitPrime::from_u128(u128::from(
                sorted_identities.iter().position(|id| *id == my_identity).unwrap() as u64 + 1,
            ));
            Box::new(Reveal::<String, Fp32BitPrime>::new(share, revealer))
        }
        Protocol::Multiply => {
            let (x_share, y_share, triple) = demo_multiply_shares(&sorted_identities, &my_identity);
            Box::new(Multiply::<String, Fp32BitPrime>::new(x_share, y_share, triple, revealer))
        }
    };

    let start = Instant::now();
    let mut engine = Engine::new(my_identity.clone());
    let mut outgoing = Vec::new();
    engine
        .init(root, peers, &mut outgoing)
        .await
        .map_err(|e| (EXIT_ABORTED, e.to_string()))?;
    for (to, body) in outgoing.drain(..) {
        net.send(&to, body).await.map_err(|e| (EXIT_TRANSPORT, e.to_string()))?;
    }

    while !engine.is_closed() {
        if engine.is_aborted() {
            return Err((EXIT_ABORTED, "engine aborted".to_string()));
        }
        let (from, body) = net.recv().await.map_err(|e| (EXIT_TRANSPORT, e.to_string()))?;
        let mut outgoing = Vec::new();
        engine
            .handle_receive(&from, &body, &mut outgoing)
            .await
            .map_err(|e| (EXIT_ABORTED, e.to_string()))?;
        for (to, body) in outgoing.drain(..) {
            net.send(&to, body).await.map_err(|e| (EXIT_TRANSPORT, e.to_string()))?;
        }
    }
    if engine.is_aborted() {
        return Err((EXIT_ABORTED, "engine aborted".to_string()));
    }

    let elapsed = start.elapsed();
    let outcome = engine.take_main_result();
    let summary = match cli.protocol {
        Protocol::Reveal => outcome
            .and_then(reveal::downcast::<Fp32BitPrime>)
            .map(|sum| sum.to_string())
            .unwrap_or_else(|| "no result".to_string()),
        Protocol::Multiply => outcome
            .and_then(multiply::downcast::<Fp32BitPrime>)
            .map(|product| product.to_string())
            .unwrap_or_else(|| "no result".to_string()),
    };

    let elapsed_display = format!("{elapsed:?}");
    let protocol_name = match cli.protocol {
        Protocol::Reveal => "reveal",
        Protocol::Multiply => "multiply",
    };
    let mut table = Table::new();
    table.set_header(vec!["identity", "protocol", "result", "wall time"]);
    table.add_row(vec![
        my_identity.as_str(),
        protocol_name,
        summary.as_str(),
        elapsed_display.as_str(),
    ]);
    println!("{table}");

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err((code, message)) => {
            eprintln!("fronctocol_tool: {message}");
            ExitCode::from(code)
        }
    }
}
