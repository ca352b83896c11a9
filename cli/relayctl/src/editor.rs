//! Pure rule-edit operations.
//!
//! Every write command reduces to `apply(rules, command)`: the result is a
//! new rule set, validated against the listen-endpoint uniqueness
//! invariant before anything touches disk.

use thiserror::Error;

use tcprelay_rules::{ConflictError, Rule, RuleSet};

/// One edit against the rule set.
#[derive(Debug, Clone)]
pub enum EditCommand {
    Add {
        bind_address: String,
        listen_port: u16,
        dest_address: String,
        dest_port: u16,
    },
    Edit {
        id: u32,
        bind_address: Option<String>,
        listen_port: Option<u16>,
        dest_address: Option<String>,
        dest_port: Option<u16>,
    },
    Delete {
        id: u32,
    },
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("no rule with id {0}")]
    UnknownId(u32),

    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

/// Apply one edit, returning the new set and the affected rule id.
///
/// Added rules get `max existing id + 1`, so ids stay stable across
/// deletes. Edits that would produce two rules on the same listen
/// endpoint are rejected whole.
pub fn apply(rules: &RuleSet, command: EditCommand) -> Result<(RuleSet, u32), EditError> {
    let mut list: Vec<Rule> = rules.rules().to_vec();

    let id = match command {
        EditCommand::Add {
            bind_address,
            listen_port,
            dest_address,
            dest_port,
        } => {
            let id = rules.next_id();
            list.push(Rule {
                id,
                bind_address,
                listen_port,
                dest_address,
                dest_port,
            });
            id
        }
        EditCommand::Edit {
            id,
            bind_address,
            listen_port,
            dest_address,
            dest_port,
        } => {
            let rule = list
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(EditError::UnknownId(id))?;
            if let Some(bind) = bind_address {
                rule.bind_address = bind;
            }
            if let Some(port) = listen_port {
                rule.listen_port = port;
            }
            if let Some(dest) = dest_address {
                rule.dest_address = dest;
            }
            if let Some(port) = dest_port {
                rule.dest_port = port;
            }
            id
        }
        EditCommand::Delete { id } => {
            let before = list.len();
            list.retain(|r| r.id != id);
            if list.len() == before {
                return Err(EditError::UnknownId(id));
            }
            id
        }
    };

    let updated = RuleSet::new(list);
    updated.validate()?;
    Ok((updated, id))
}
