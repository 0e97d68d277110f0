use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;
use waste_dispatch::navigation::{dial_link, format_coordinates, map_link, Itinerary, Platform};
use waste_dispatch::{
    export_csv, short_id, Action, CollectionFilter, Coordinates, DispatchClient, DispatchError,
    Home, ProgressRing, RequestWithRequester, Result, SignupForm, SignupOutcome, Snapshot,
    StatusFilter,
};

#[derive(Parser, Debug)]
#[command(name = "waste-dispatch", author, version, about = "Waste collection requests and dispatch")]
struct Cli {
    /// Account email
    #[arg(long, env = "DISPATCH_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "DISPATCH_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and show which area the account lands on
    Login,
    /// Sign in, then sign out and close the change feed
    Logout,
    /// Create an account
    Signup {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        phone: String,
    },
    /// Request a pickup at the given position
    Request {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// List my own requests
    History,
    /// Totals over my own requests
    Stats,
    Profile,
    /// Pending requests with requester details
    Pending,
    /// Pending requests as map markers
    Map,
    Accept { id: Uuid },
    Reject { id: Uuid },
    /// Collections I accepted and have not finished
    Active,
    Complete { id: Uuid },
    Dashboard,
    /// Map and phone links for one of my active collections
    Navigate {
        id: Uuid,
        #[arg(long)]
        platform: Option<String>,
    },
    /// Visit all active collections in order from a starting point
    Route {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Keep a list on screen, refreshed on every change
    Watch {
        #[arg(value_enum)]
        list: WatchedList,
    },
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WatchedList {
    Pending,
    Active,
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    Stats,
    /// Latest requests, optionally filtered
    Recent {
        #[arg(long, default_value = "all")]
        status: String,
        #[arg(long, default_value = "")]
        search: String,
    },
    Collectors,
    /// Write the recent requests as CSV
    Export {
        #[arg(long, default_value = "all")]
        status: String,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Command {
    fn action(&self) -> Action {
        match self {
            Command::Login => Action::SignIn,
            Command::Logout => Action::SignOut,
            Command::Signup { .. } => Action::SignUp,
            Command::Request { .. } => Action::RequestCollection,
            Command::History | Command::Pending | Command::Map => Action::LoadRequests,
            Command::Stats => Action::LoadStats,
            Command::Dashboard => Action::LoadDashboard,
            Command::Profile => Action::LoadProfile,
            Command::Accept { .. } => Action::AcceptRequest,
            Command::Reject { .. } => Action::RejectRequest,
            Command::Active => Action::LoadActive,
            Command::Complete { .. } => Action::CompleteCollection,
            Command::Navigate { .. } | Command::Route { .. } => Action::Navigate,
            Command::Watch { .. } => Action::Watch,
            Command::Admin(AdminCommand::Export { .. }) => Action::Export,
            Command::Admin(_) => Action::LoadAdmin,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(e) = fmt().with_env_filter(filter).try_init() {
        eprintln!("tracing init failed: {}", e);
    }

    let cli = Cli::parse();
    let client = DispatchClient::from_env().context("failed to configure the backend client")?;

    let action = cli.command.action();
    if let Err(e) = run(&client, &cli).await {
        error!(error = %e, ?action, "command failed");
        eprintln!("{}", e.user_message(action));
        std::process::exit(1);
    }
    Ok(())
}

fn credentials(cli: &Cli) -> Result<(&str, &str)> {
    match (cli.email.as_deref(), cli.password.as_deref()) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            Ok((email, password))
        }
        _ => Err(DispatchError::InvalidInput(
            "Veuillez remplir tous les champs".to_string(),
        )),
    }
}

async fn sign_in(client: &DispatchClient, cli: &Cli) -> Result<Home> {
    let (email, password) = credentials(cli)?;
    client.login(email, password).await
}

async fn run(client: &DispatchClient, cli: &Cli) -> Result<()> {
    if let Command::Signup { full_name, phone } = &cli.command {
        let form = SignupForm {
            full_name: full_name.clone(),
            phone: phone.clone(),
            email: cli.email.clone().unwrap_or_default(),
            password: cli.password.clone().unwrap_or_default(),
        };
        match client.signup(&form).await? {
            SignupOutcome::Registered => {
                println!("Inscription réussie ! Vous pouvez maintenant vous connecter.")
            }
            SignupOutcome::AwaitingConfirmation => {
                println!("Inscription réussie ! Confirmez votre adresse email pour vous connecter.")
            }
        }
        return Ok(());
    }

    let home = sign_in(client, cli).await?;

    match &cli.command {
        Command::Signup { .. } => {}
        Command::Login => match home {
            Home::Collector => println!("Espace collecteur"),
            Home::Consumer => println!("Espace utilisateur"),
            Home::Login => println!("Non connecté"),
        },
        Command::Logout => {
            client.logout().await?;
            println!("Déconnecté");
        }
        Command::Request { lat, lng } => {
            let created = client.request_collection(Coordinates::new(*lat, *lng)?).await?;
            println!(
                "Demande {} envoyée ({})",
                short_id(&created.id.to_string()),
                created.status.label()
            );
        }
        Command::History => {
            for request in client.my_requests().await? {
                println!(
                    "{}  {}  {}  {}",
                    short_id(&request.id.to_string()),
                    request.created_at.format("%Y-%m-%d"),
                    request.status.label(),
                    format_coordinates(request.coordinates(), 4)
                );
            }
        }
        Command::Stats => {
            let stats = client.my_stats().await?;
            println!("Demandes      {}", stats.total);
            println!("En attente    {}", stats.pending);
            println!("Terminées     {}", stats.completed);
            println!("Annulées      {}", stats.cancelled);
            println!("Déchets (kg)  {}", stats.estimated_waste_kg);
        }
        Command::Profile => {
            let profile = client.my_profile().await?;
            println!("Nom        {}", profile.full_name.as_deref().unwrap_or("-"));
            println!("Email      {}", profile.email.as_deref().unwrap_or("-"));
            println!("Téléphone  {}", profile.phone.as_deref().unwrap_or("-"));
        }
        Command::Pending => print_requests(&client.pending_requests().await?),
        Command::Map => {
            for marker in client.pending_markers().await? {
                println!(
                    "{}  {}  {}",
                    short_id(&marker.id.to_string()),
                    format_coordinates(marker.coordinates(), 5),
                    marker.created_at.format("%Y-%m-%d")
                );
            }
        }
        Command::Accept { id } => {
            let request = client.accept(*id).await?;
            println!("Demande {} : {}", short_id(&request.id.to_string()), request.status.label());
        }
        Command::Reject { id } => {
            let request = client.reject(*id).await?;
            println!("Demande {} : {}", short_id(&request.id.to_string()), request.status.label());
        }
        Command::Active => print_requests(&client.active_collections().await?),
        Command::Complete { id } => {
            client.mark_completed(*id).await?;
            println!("Collecte marquée comme terminée");
        }
        Command::Dashboard => {
            let dashboard = client.dashboard().await?;
            let ring = ProgressRing::default();
            let done = waste_dispatch::percent_of(
                dashboard.completed_today,
                dashboard.total_collections,
            );
            println!("Bonjour, {}", dashboard.full_name.as_deref().unwrap_or("collecteur"));
            println!("Collectes totales       {}", dashboard.total_collections);
            println!("Demandes en attente     {}", dashboard.pending_requests);
            println!(
                "Terminées aujourd'hui   {} ({:.0}%, offset {:.1})",
                dashboard.completed_today,
                done,
                ring.dash_offset(done)
            );
            println!("Déchets collectés (kg)  {}", dashboard.total_waste_kg);
        }
        Command::Navigate { id, platform } => {
            let platform = match platform {
                Some(name) => name.parse()?,
                None => Platform::current(),
            };
            let active = client.active_collections().await?;
            let row = active
                .iter()
                .find(|row| row.request.id == *id)
                .ok_or_else(|| DispatchError::NotFound(format!("collection request {}", id)))?;
            println!("Carte      {}", map_link(platform, row.request.coordinates()));
            match dial_link(row.requester_phone()) {
                Ok(link) => println!("Appeler    {}", link),
                Err(e) => println!("Appeler    {}", e.user_message(Action::Navigate)),
            }
        }
        Command::Route { lat, lng } => {
            let start = Coordinates::new(*lat, *lng)?;
            let stops: Vec<_> = client
                .active_collections()
                .await?
                .into_iter()
                .map(|row| row.request)
                .collect();
            let itinerary = Itinerary::from_stops(start, &stops);
            for (i, point) in itinerary.waypoints().iter().enumerate() {
                println!("{:>2}. {}", i, format_coordinates(*point, 5));
            }
            println!("Distance totale: {:.1} km", itinerary.total_distance_km());
        }
        Command::Watch { list } => watch(client, *list).await?,
        Command::Admin(admin) => run_admin(client, admin).await?,
    }
    Ok(())
}

async fn run_admin(client: &DispatchClient, command: &AdminCommand) -> Result<()> {
    match command {
        AdminCommand::Stats => {
            let stats = client.admin_stats().await?;
            println!("Utilisateurs        {}", stats.total_users);
            println!("Collecteurs         {}", stats.total_collectors);
            println!("Demandes            {}", stats.total_requests);
            println!(
                "En attente          {} ({:.0}%)",
                stats.pending_requests,
                stats.share(stats.pending_requests)
            );
            println!(
                "En cours            {} ({:.0}%)",
                stats.in_flight(),
                stats.share(stats.in_flight())
            );
            println!(
                "Terminées           {} ({:.0}%)",
                stats.completed_requests,
                stats.share(stats.completed_requests)
            );
            println!("Déchets (kg)        {}", stats.total_waste_kg);
        }
        AdminCommand::Recent { status, search } => {
            let filter = CollectionFilter {
                status: status.parse::<StatusFilter>()?,
                query: search.clone(),
            };
            let rows = client.recent_collections().await?;
            for row in filter.apply(&rows) {
                println!(
                    "{}  {}  {}  {}  {}",
                    short_id(&row.request.id.to_string()),
                    row.request.status.label(),
                    row.request.created_at.format("%Y-%m-%d"),
                    row.user_name().unwrap_or("N/A"),
                    row.collector_name().unwrap_or("N/A")
                );
            }
        }
        AdminCommand::Collectors => {
            for entry in client.collector_performance().await? {
                println!(
                    "{}  {} collectes  {} kg",
                    entry.profile.full_name.as_deref().unwrap_or("N/A"),
                    entry.completed_collections,
                    entry.waste_collected_kg
                );
            }
        }
        AdminCommand::Export {
            status,
            search,
            out,
        } => {
            let filter = CollectionFilter {
                status: status.parse::<StatusFilter>()?,
                query: search.clone(),
            };
            let rows = client.recent_collections().await?;
            let csv = export_csv(filter.apply(&rows));
            match out {
                Some(path) => fs::write(path, csv).map_err(|e| {
                    DispatchError::InvalidInput(format!(
                        "Impossible d'écrire {}: {}",
                        path.display(),
                        e
                    ))
                })?,
                None => print!("{}", csv),
            }
        }
    }
    Ok(())
}

fn print_requests(rows: &[RequestWithRequester]) {
    if rows.is_empty() {
        println!("Aucune demande");
        return;
    }
    for row in rows {
        println!(
            "{}  {}  {}  {}  {}",
            short_id(&row.request.id.to_string()),
            row.request.status.label(),
            row.requester_name().unwrap_or("Client"),
            row.requester_phone().unwrap_or("-"),
            format_coordinates(row.request.coordinates(), 4)
        );
    }
}

async fn watch(client: &DispatchClient, list: WatchedList) -> Result<()> {
    let live = match list {
        WatchedList::Pending => client.watch_pending().await?,
        WatchedList::Active => client.watch_active().await?,
    };
    let mut snapshots = live.subscribe();

    loop {
        match &*snapshots.borrow_and_update() {
            Snapshot::Loading => println!("Chargement..."),
            Snapshot::Ready(rows) => {
                println!("--- {} demande(s)", rows.len());
                print_requests(rows);
            }
            Snapshot::Failed(_) => println!("{}", Action::Watch.failure_message()),
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    live.stop().await
}
