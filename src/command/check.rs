use argh::FromArgs;
use reauth::configuration::Configuration;
use reauth::RuleSet;

use crate::command;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "check",
    description = "Validate the configuration and print the resulting rules"
)]
pub struct Options {}

pub struct Command {}

impl Command {
    pub fn run(config: &Configuration) -> Result<(), command::Error> {
        let cache = config.cache.to_backend()?;
        let rules = config.build_rules(&cache)?;

        for line in describe(&rules) {
            println!("{line}");
        }
        println!("Configuration OK, {} rule(s)", rules.len());
        Ok(())
    }
}

fn describe(rules: &RuleSet) -> Vec<String> {
    rules
        .rules()
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let backends = rule
                .backends()
                .iter()
                .map(|backend| backend.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");

            let mut line = format!("rule #{}: {}", index + 1, rule.paths().join(" "));
            if !rule.exceptions().is_empty() {
                line.push_str(&format!(" except {}", rule.exceptions().join(" ")));
            }
            line.push_str(&format!(" -> [{backends}] on failure {:?}", rule.on_failure()));
            line
        })
        .collect()
}
