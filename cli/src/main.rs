use std::collections::HashMap;

use clap::{Args, Parser, Subcommand};
use pagebuilder::builder::canvas::{self, CanvasView, RenderNode};
use pagebuilder::builder::drag::{DragSource, DropTarget};
use pagebuilder::builder::form::PanelState;
use pagebuilder::client::{BuilderApi, BuilderSession, ClientError, DropOutcome, HttpBuilderApi, SessionError};
use pagebuilder::error::ErrorCode;
use pagebuilder::model::{Component, ComponentFilter, NewPage, NewProject};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing session token; pass --session-token or set PAGEBUILDER_SESSION_TOKEN")]
    MissingSessionToken,
    #[error("[{code}] {0}", code = code(.0))]
    Client(#[from] ClientError),
    #[error("[{code}] {0}", code = code(.0))]
    Session(#[from] SessionError),
    #[error("instance {0} is not on this page")]
    UnknownInstance(Uuid),
    #[error("expected key=value, got `{0}`")]
    InvalidAssignment(String),
    #[error("server at {0} is not healthy")]
    Unhealthy(String),
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

fn code(err: &impl ErrorCode) -> &'static str {
    err.error_code()
}

#[derive(Parser, Debug)]
#[command(name = "pagebuilder-cli", about = "Page builder API CLI")]
struct Cli {
    #[arg(long, env = "PAGEBUILDER_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[arg(long, env = "PAGEBUILDER_SESSION_TOKEN")]
    session_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    /// Dev login; prints the session token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    Me,
    Project(ProjectCommand),
    Page(PageCommand),
    Component(ComponentCommand),
    Instance(InstanceCommand),
    /// Drop a library component onto a page, at the root or into a container.
    Drop {
        page_id: Uuid,
        #[arg(long)]
        component: Uuid,
        #[arg(long)]
        parent: Option<Uuid>,
    },
    /// Drag an instance onto a sibling's position.
    Move {
        page_id: Uuid,
        instance_id: Uuid,
        #[arg(long)]
        over: Uuid,
    },
    /// Show the property form of an instance.
    Form { page_id: Uuid, instance_id: Uuid },
    /// Validate and save properties given as key=value pairs.
    SetProps {
        page_id: Uuid,
        instance_id: Uuid,
        #[arg(required = true)]
        values: Vec<String>,
    },
    Delete { page_id: Uuid, instance_id: Uuid },
    Render { page_id: Uuid },
}

#[derive(Args, Debug)]
struct ProjectCommand {
    #[command(subcommand)]
    command: ProjectSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProjectSubcommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = false)]
        public: bool,
    },
}

#[derive(Args, Debug)]
struct PageCommand {
    #[command(subcommand)]
    command: PageSubcommand,
}

#[derive(Subcommand, Debug)]
enum PageSubcommand {
    List {
        project_id: Uuid,
    },
    Create {
        project_id: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        path: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ComponentCommand {
    #[command(subcommand)]
    command: ComponentSubcommand,
}

#[derive(Subcommand, Debug)]
enum ComponentSubcommand {
    List {
        #[arg(long)]
        project_id: Option<Uuid>,
        #[arg(long)]
        global: Option<bool>,
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Args, Debug)]
struct InstanceCommand {
    #[command(subcommand)]
    command: InstanceSubcommand,
}

#[derive(Subcommand, Debug)]
enum InstanceSubcommand {
    List { page_id: Uuid },
    Tree { page_id: Uuid },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Ping => run_ping(&cli.base_url).await,
        Command::Login { email, name } => run_login(&cli.base_url, &email, name.as_deref()).await,
        command => {
            let token = cli.session_token.ok_or(CliError::MissingSessionToken)?;
            let api = HttpBuilderApi::new(&cli.base_url, Some(token))?;
            run_authenticated(api, command).await
        }
    }
}

/// `RUST_LOG` directives, or warnings only when unset.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .map_or_else(|| EnvFilter::new("warn"), EnvFilter::new)
}

async fn run_ping(base_url: &str) -> Result<(), CliError> {
    let api = HttpBuilderApi::new(base_url, None)?;
    if !api.health().await? {
        return Err(CliError::Unhealthy(api.base_url().to_owned()));
    }
    println!("ok");
    Ok(())
}

async fn run_login(base_url: &str, email: &str, name: Option<&str>) -> Result<(), CliError> {
    let api = HttpBuilderApi::new(base_url, None)?;
    let session = api.dev_login(email, name).await?;
    eprintln!("logged in as {} <{}>", session.user.name, session.user.email);
    println!("{}", session.token);
    Ok(())
}

async fn run_authenticated(api: HttpBuilderApi, command: Command) -> Result<(), CliError> {
    match command {
        Command::Ping | Command::Login { .. } => Ok(()),
        Command::Me => print_json(&api.me().await?),
        Command::Project(project) => match project.command {
            ProjectSubcommand::List => print_json(&api.list_projects().await?),
            ProjectSubcommand::Create { name, description, public } => {
                let body = NewProject { name, description, is_public: public };
                print_json(&api.create_project(&body).await?)
            }
        },
        Command::Page(page) => match page.command {
            PageSubcommand::List { project_id } => print_json(&api.list_pages(project_id).await?),
            PageSubcommand::Create { project_id, title, path } => {
                print_json(&api.create_page(project_id, &NewPage { title, path }).await?)
            }
        },
        Command::Component(component) => match component.command {
            ComponentSubcommand::List { project_id, global, category } => {
                let filter = ComponentFilter { project_id, is_global: global, category };
                print_json(&api.list_components(&filter).await?)
            }
        },
        Command::Instance(instance) => match instance.command {
            InstanceSubcommand::List { page_id } => print_json(&api.list_instances(page_id).await?),
            InstanceSubcommand::Tree { page_id } => run_tree(api, page_id).await,
        },
        Command::Drop { page_id, component, parent } => {
            let target = parent.map_or(DropTarget::CanvasRoot, |parent_id| DropTarget::DroppableArea { parent_id });
            let mut session = BuilderSession::new(api, page_id);
            session.drag_start(DragSource::Library { component_id: component })?;
            print_outcome(session.drop_on(target).await?)
        }
        Command::Move { page_id, instance_id, over } => run_move(api, page_id, instance_id, over).await,
        Command::Form { page_id, instance_id } => {
            let mut session = BuilderSession::new(api, page_id);
            session.select(instance_id);
            match session.property_panel().await? {
                PanelState::Empty => Err(CliError::UnknownInstance(instance_id)),
                PanelState::Editing(form) => {
                    println!("{} ({})", form.title, form.instance_id);
                    for field in &form.fields {
                        let marker = if field.required { "*" } else { "" };
                        println!(
                            "  {}{marker}\t{}\t[{}]\t{}",
                            field.key,
                            field.label,
                            field.kind.input_type(),
                            field.display_value()
                        );
                    }
                    Ok(())
                }
            }
        }
        Command::SetProps { page_id, instance_id, values } => {
            let values = parse_assignments(&values)?;
            let mut session = BuilderSession::new(api, page_id);
            session.select(instance_id);
            print_json(&session.submit_properties(&values).await?)
        }
        Command::Delete { page_id, instance_id } => {
            let mut session = BuilderSession::new(api, page_id);
            session.select(instance_id);
            let deleted = session.delete_selected().await?;
            println!("deleted {deleted}");
            Ok(())
        }
        Command::Render { page_id } => {
            println!("{}", api.render_page(page_id).await?);
            Ok(())
        }
    }
}

async fn run_move(api: HttpBuilderApi, page_id: Uuid, instance_id: Uuid, over: Uuid) -> Result<(), CliError> {
    let mut session = BuilderSession::new(api, page_id);
    let instances = session.instances().await?;
    let parent_of = |id: Uuid| {
        instances
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.parent_id)
            .ok_or(CliError::UnknownInstance(id))
    };
    let source = DragSource::Instance { instance_id, parent_id: parent_of(instance_id)? };
    let target = DropTarget::Instance { instance_id: over, parent_id: parent_of(over)? };

    session.drag_start(source)?;
    print_outcome(session.drop_on(target).await?)
}

async fn run_tree(api: HttpBuilderApi, page_id: Uuid) -> Result<(), CliError> {
    let components: HashMap<Uuid, Component> = api
        .list_components(&ComponentFilter::default())
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    let instances = api.list_instances(page_id).await?;
    let view = CanvasView::project(&instances);
    if view.is_empty() {
        println!("(empty page)");
        return Ok(());
    }
    let tree = canvas::build_tree(&instances);
    for node in &tree {
        print_node(node, &components, 0);
    }
    let shown: usize = tree.iter().map(RenderNode::size).sum();
    println!("{} root(s), {shown} of {} instance(s) shown", view.len(), instances.len());
    Ok(())
}

fn print_node(node: &RenderNode, components: &HashMap<Uuid, Component>, depth: usize) {
    let name = components
        .get(&node.instance.component_id)
        .map_or("<missing component>", Component::label);
    println!(
        "{:indent$}{} {name} [{}] v{}",
        "",
        node.instance.order_index,
        node.instance.id,
        node.instance.version,
        indent = depth * 2
    );
    for child in &node.children {
        print_node(child, components, depth + 1);
    }
}

fn print_outcome(outcome: DropOutcome) -> Result<(), CliError> {
    match outcome {
        DropOutcome::Created(instance) => print_json(&instance),
        DropOutcome::Reordered(group) => print_json(&group),
        DropOutcome::Ignored(reason) => {
            eprintln!("drop ignored: {}", serde_json::to_string(&reason)?);
            Ok(())
        }
    }
}

fn parse_assignments(pairs: &[String]) -> Result<HashMap<String, String>, CliError> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .map(|(key, value)| (key.trim().to_owned(), value.to_owned()))
                .ok_or_else(|| CliError::InvalidAssignment(pair.clone()))
        })
        .collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let value: Value = serde_json::to_value(value)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
