//! Assembles the person-service stack and writes its synthesized template.
use clap::Parser;
use ground::{
    aws::{
        apigatewayv2::{HttpApi, Method},
        dynamodb::{AttributeType, Table},
        lambda::{FunctionSpec, ManagedFunction},
    },
    Stack, StackConfig, Stage, Template,
};

const STACK_NAME: &str = "personService";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// The stage to assemble for.
    #[arg(long, env = "STAGE", default_value = "dev")]
    stage: Stage,

    /// Remove all resources when the stack is deleted. Only to be used on dev
    /// and test environments.
    #[arg(long, default_value_t = false)]
    ephemeral: bool,

    /// Directory where packaged function artifacts live, keyed by function
    /// name.
    #[arg(long, default_value = "target/lambda")]
    asset_dir: std::path::PathBuf,

    /// Where to write the synthesized template.
    #[arg(long, default_value = "template.json")]
    out: std::path::PathBuf,
}

/// Declare the whole stack: one table, one managed function wired to it, and
/// an HTTP API routing `POST /` to the function.
fn assemble(config: StackConfig) -> anyhow::Result<Template> {
    let mut stack = Stack::new(config)?;

    let persons_table = Table::new("id", AttributeType::String).create(&mut stack, "personsTable")?;

    let add_person = ManagedFunction::create(
        &mut stack,
        FunctionSpec::new("add_person").env("TABLE_NAME", persons_table.name()),
    )?;
    persons_table.grant_write_data(&mut stack, &add_person)?;

    let api = HttpApi::create(&mut stack, "personApi")?;
    api.add_route(&mut stack, Method::Post, "/", &add_person)?;
    stack.output("apiUrl", api.endpoint())?;

    Ok(stack.synth()?)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = StackConfig::new(STACK_NAME)
        .with_stage(cli.stage)
        .ephemeral(cli.ephemeral)
        .with_asset_dir(&cli.asset_dir);
    let template = assemble(config)?;

    std::fs::write(&cli.out, template.to_json_string_pretty()?)?;
    log::info!("wrote {}", cli.out.display());
    println!("{template}");
    Ok(())
}
