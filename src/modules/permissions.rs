//! Per-guild, per-role command permissions.
//!
//! Permissions are stored per guild as a table keyed by command path
//! (`_`-joined, e.g. `config_prefix`), each entry mapping role ids (or the
//! wildcard `*`) to allow/deny.
//!
//! Resolution walks from the most specific path level to the bare trigger.
//! At each level that has an entry: any requester role explicitly allowed
//! wins, else a wildcard entry decides, else any role explicitly denied
//! loses.
//! Levels without a decision defer to the next broader one; after the
//! trigger comes a top-level `*` entry and finally the command's default,
//! derived from the role class its module declared.

use crate::bot::context::BotContext;
use crate::bot::dispatch::Authorizer;
use crate::bot::module::{CommandModule, Module, ModuleDescriptor, RoleClass};
use crate::bot::registry::ModuleRegistry;
use crate::error::{ModuleError, ModuleResult, PersistenceError};
use crate::platform::{IncomingMessage, Requester, RoleId};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Record key of the per-guild permission table.
pub const PERMISSIONS_KEY: &str = "permissions";

/// Reserved role id and path key matching everything.
pub const WILDCARD: &str = "*";

pub const PATH_DELIMITER: &str = "_";

/// Role id (or `*`) to allow/deny.
pub type RolePermissions = BTreeMap<String, bool>;

/// Permission key to role decisions.
pub type PermissionTable = BTreeMap<String, RolePermissions>;

/// Persisted shape of the `permissions` record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildPermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionTable>,
}

/// Table key for a command path.
pub fn permission_key<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(PATH_DELIMITER)
}

/// How a permission question was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An entry at `key` decided.
    Explicit { key: String, allowed: bool },
    /// The top-level `*` entry decided.
    Global(bool),
    /// Nothing stored decided; the command's default applied.
    Default(bool),
    /// No entry and no default.
    Unresolved,
}

impl Resolution {
    pub fn allowed(&self) -> bool {
        match self {
            Self::Explicit { allowed, .. } => *allowed,
            Self::Global(allowed) | Self::Default(allowed) => *allowed,
            Self::Unresolved => false,
        }
    }
}

/// Decision of one entry for a set of roles. Allow is sticky: once any held
/// role or the wildcard is allowed, denials at the same level do not revoke
/// it.
fn decide(entry: &RolePermissions, roles: &[RoleId]) -> Option<bool> {
    let mut decision = None;
    for role in roles {
        match entry.get(role.as_str()) {
            Some(true) => return Some(true),
            Some(false) => decision = Some(false),
            None => {}
        }
    }
    entry.get(WILDCARD).copied().or(decision)
}

/// Resolve `path` for a requester holding `roles`.
pub fn resolve<S: AsRef<str>>(
    table: &PermissionTable,
    defaults: &PermissionTable,
    path: &[S],
    roles: &[RoleId],
) -> Resolution {
    let mut default = None;
    for depth in (1..=path.len()).rev() {
        let key = permission_key(&path[..depth]);
        if let Some(entry) = table.get(&key)
            && let Some(allowed) = decide(entry, roles)
        {
            return Resolution::Explicit { key, allowed };
        }
        if default.is_none() {
            default = defaults.get(&key).and_then(|d| d.get(WILDCARD)).copied();
        }
    }

    if let Some(entry) = table.get(WILDCARD)
        && let Some(allowed) = decide(entry, roles)
    {
        return Resolution::Global(allowed);
    }

    default.map_or(Resolution::Unresolved, Resolution::Default)
}

/// Result of [`toggle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionChange {
    Applied,
    Removed,
}

/// Set `role` at `key` to `state`, or clear it if it already had that state.
pub fn toggle(table: &mut PermissionTable, key: &str, role: &str, state: bool) -> PermissionChange {
    let entry = table.entry(key.to_string()).or_default();
    if entry.get(role) == Some(&state) {
        entry.remove(role);
        if entry.is_empty() {
            table.remove(key);
        }
        PermissionChange::Removed
    } else {
        entry.insert(role.to_string(), state);
        PermissionChange::Applied
    }
}

/// Defaults from every accepted trigger binding: `{trigger: {"*": everyone}}`.
pub fn build_defaults(registry: &ModuleRegistry) -> PermissionTable {
    let mut defaults = PermissionTable::new();
    for (trigger, module) in registry.command_bindings() {
        let Some(class) = module.descriptor().role_class(trigger) else {
            error!(trigger, module = %module.descriptor().name, "Bound trigger has no role class");
            continue;
        };
        defaults
            .entry(trigger.to_string())
            .or_default()
            .insert(WILDCARD.to_string(), class == RoleClass::Everyone);
    }
    defaults
}

pub struct PermissionsModule {
    descriptor: ModuleDescriptor,
    defaults: RwLock<PermissionTable>,
}

impl Default for PermissionsModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionsModule {
    pub const NAME: &'static str = "Permissions";

    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new(Self::NAME, "Per-role command access")
                .command("allow", RoleClass::Owner)
                .command("disallow", RoleClass::Owner)
                .command("permissions", RoleClass::Owner),
            defaults: RwLock::new(PermissionTable::new()),
        }
    }

    /// Snapshot of the defaults table.
    pub fn defaults(&self) -> PermissionTable {
        self.defaults.read().clone()
    }

    /// Rebuild the defaults table from the registry's bound triggers.
    pub fn load_defaults(&self, registry: &ModuleRegistry) {
        let defaults = build_defaults(registry);
        info!(commands = defaults.len(), "Permission defaults built");
        *self.defaults.write() = defaults;
    }

    /// May the requester run `path`? DMs and guild owners always may.
    ///
    /// The guild's permission record is committed before returning.
    pub async fn check_permissions(
        &self,
        ctx: &BotContext,
        path: &[String],
        requester: &Requester,
    ) -> Result<bool, PersistenceError> {
        let Some(guild) = requester.guild.as_ref() else {
            return Ok(true);
        };
        if requester.is_owner {
            return Ok(true);
        }

        let mut record = ctx
            .storage
            .guild::<GuildPermissions>(guild, PERMISSIONS_KEY)
            .await?;
        let table = record.permissions.get_or_insert_with(PermissionTable::new);
        let resolution = resolve(table, &self.defaults.read(), path, &requester.roles);

        if resolution == Resolution::Unresolved {
            warn!(guild = %guild, trigger = ?path.first(), "Command has no default permission, denying");
        } else {
            debug!(guild = %guild, ?resolution, "Permission resolved");
        }

        if let Err(e) = record.commit().await {
            debug!(guild = %guild, error = %e, "Permission record not committed");
        }
        Ok(resolution.allowed())
    }

    async fn set_permission(
        &self,
        ctx: &BotContext,
        state: bool,
        role: &str,
        path: &[String],
        message: &IncomingMessage,
    ) -> ModuleResult {
        let Some(guild) = message.guild_id() else {
            return Ok(());
        };

        let role_id = if role == WILDCARD {
            Some(RoleId::from(WILDCARD))
        } else {
            ctx.platform.resolve_role(guild, role).await?
        };
        let Some(role_id) = role_id else {
            ctx.reply(message, &format!("The role '{role}' does not exist."))
                .await?;
            return Ok(());
        };

        let key = permission_key(path);
        let mut record = ctx
            .storage
            .guild::<GuildPermissions>(guild, PERMISSIONS_KEY)
            .await?;
        let table = record.permissions.get_or_insert_with(PermissionTable::new);
        let change = toggle(table, &key, role_id.as_str(), state);
        if let Err(e) = record.commit().await {
            warn!(guild = %guild, error = %e, "Permission change not persisted");
        }
        info!(guild = %guild, key = %key, role = %role_id, state, ?change, "Permission updated");

        let reply = match change {
            PermissionChange::Applied => "Permission applied.",
            PermissionChange::Removed => "Permission removed.",
        };
        ctx.reply(message, reply).await
    }

    async fn list(&self, ctx: &BotContext, message: &IncomingMessage) -> ModuleResult {
        let Some(guild) = message.guild_id() else {
            return Ok(());
        };
        let record = ctx
            .storage
            .guild::<GuildPermissions>(guild, PERMISSIONS_KEY)
            .await?;
        let text = render_table(record.permissions.as_ref());
        if let Err(e) = record.commit().await {
            debug!(guild = %guild, error = %e, "Permission record not committed");
        }
        ctx.reply(message, &text).await
    }

    fn help(prefix: &str) -> String {
        format!(
            "```\nCommands:\n    {prefix}allow [role] [command]\n        - allow a role to use a command\n    {prefix}disallow [role] [command]\n        - disallow a role from using a command\n    {prefix}permissions\n        - list this server's permissions\n\n    Use * as the role to match everyone. Repeating a rule removes it.\n```"
        )
    }
}

fn render_table(table: Option<&PermissionTable>) -> String {
    let Some(table) = table.filter(|t| !t.is_empty()) else {
        return "No permissions have been set.".to_string();
    };
    let mut out = String::from("```\nPermissions:\n");
    for (key, roles) in table {
        let rules: Vec<String> = roles
            .iter()
            .map(|(role, allowed)| {
                format!("{role} = {}", if *allowed { "allow" } else { "deny" })
            })
            .collect();
        let _ = writeln!(out, "    {key}: {}", rules.join(", "));
    }
    out.push_str("```");
    out
}

#[async_trait]
impl Module for PermissionsModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn on_load(&self, ctx: &BotContext) -> ModuleResult {
        self.load_defaults(&ctx.modules);
        Ok(())
    }

    fn into_command(self: Arc<Self>) -> Option<Arc<dyn CommandModule>> {
        Some(self)
    }
}

#[async_trait]
impl CommandModule for PermissionsModule {
    async fn on_command(
        &self,
        ctx: &BotContext,
        command: &[String],
        message: &IncomingMessage,
    ) -> ModuleResult {
        match command {
            [verb, ..] if verb == "permissions" => self.list(ctx, message).await,
            [verb, role, path @ ..] if !path.is_empty() && (verb == "allow" || verb == "disallow") => {
                self.set_permission(ctx, verb == "allow", role, path, message)
                    .await
            }
            [_, _] => Err(ModuleError::NeedMoreArgs),
            _ => {
                let prefix = ctx.prefix_for(message.guild_id());
                ctx.reply(message, &Self::help(&prefix)).await
            }
        }
    }
}

#[async_trait]
impl Authorizer for PermissionsModule {
    async fn authorize(
        &self,
        ctx: &BotContext,
        path: &[String],
        requester: &Requester,
    ) -> Result<bool, PersistenceError> {
        self.check_permissions(ctx, path, requester).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &[(&str, bool)])]) -> PermissionTable {
        entries
            .iter()
            .map(|(key, roles)| {
                (
                    key.to_string(),
                    roles.iter().map(|(r, a)| (r.to_string(), *a)).collect(),
                )
            })
            .collect()
    }

    fn roles(ids: &[&str]) -> Vec<RoleId> {
        ids.iter().map(|id| RoleId::from(*id)).collect()
    }

    fn owner_default(trigger: &str) -> PermissionTable {
        table(&[(trigger, &[("*", false)])])
    }

    #[test]
    fn keys_join_with_underscore() {
        assert_eq!(permission_key(&["config", "prefix"]), "config_prefix");
        assert_eq!(permission_key(&["ping"]), "ping");
    }

    #[test]
    fn allow_beats_deny_at_same_level() {
        let t = table(&[("ping", &[("A", false), ("B", true)])]);
        let r = resolve(&t, &owner_default("ping"), &["ping"], &roles(&["A", "B"]));
        assert!(r.allowed());
        let r = resolve(&t, &owner_default("ping"), &["ping"], &roles(&["B", "A"]));
        assert!(r.allowed());
    }

    #[test]
    fn wildcard_allow_overrides_role_deny() {
        let t = table(&[("ping", &[("A", false), ("*", true)])]);
        let r = resolve(&t, &owner_default("ping"), &["ping"], &roles(&["A"]));
        assert_eq!(
            r,
            Resolution::Explicit {
                key: "ping".into(),
                allowed: true
            }
        );
    }

    #[test]
    fn role_deny_applies_without_wildcard() {
        let t = table(&[("ping", &[("A", false)]), ("*", &[("*", true)])]);
        let r = resolve(&t, &owner_default("ping"), &["ping"], &roles(&["A"]));
        assert!(!r.allowed());
        let r = resolve(&t, &owner_default("ping"), &["ping"], &roles(&["C"]));
        assert_eq!(r, Resolution::Global(true));
    }

    #[test]
    fn specific_level_overrides_broader() {
        let t = table(&[
            ("config", &[("*", false)]),
            ("config_prefix", &[("A", true)]),
        ]);
        let d = owner_default("config");
        assert!(resolve(&t, &d, &["config", "prefix", "\"!\""], &roles(&["A"])).allowed());
        assert!(!resolve(&t, &d, &["config", "other"], &roles(&["A"])).allowed());
    }

    #[test]
    fn undecided_level_defers_to_broader() {
        let t = table(&[
            ("config_prefix", &[("X", true)]),
            ("config", &[("A", true)]),
            ("*", &[("A", false)]),
        ]);
        let r = resolve(&t, &owner_default("config"), &["config", "prefix"], &roles(&["A"]));
        assert_eq!(
            r,
            Resolution::Explicit {
                key: "config".into(),
                allowed: true
            }
        );
    }

    #[test]
    fn global_wildcard_entry_applies_after_trigger() {
        let t = table(&[("*", &[("A", true)])]);
        let r = resolve(&t, &owner_default("ping"), &["ping"], &roles(&["A"]));
        assert_eq!(r, Resolution::Global(true));
    }

    #[test]
    fn falls_back_to_declared_default() {
        let defaults = table(&[("ping", &[("*", true)]), ("config", &[("*", false)])]);
        let empty = PermissionTable::new();
        assert_eq!(
            resolve(&empty, &defaults, &["ping", "x"], &roles(&[])),
            Resolution::Default(true)
        );
        assert_eq!(
            resolve(&empty, &defaults, &["config"], &roles(&["A"])),
            Resolution::Default(false)
        );
    }

    #[test]
    fn missing_default_denies() {
        let r = resolve(
            &PermissionTable::new(),
            &PermissionTable::new(),
            &["ghost"],
            &roles(&["A"]),
        );
        assert_eq!(r, Resolution::Unresolved);
        assert!(!r.allowed());
    }

    #[test]
    fn toggle_applies_then_removes() {
        let mut t = PermissionTable::new();
        assert_eq!(toggle(&mut t, "ping", "A", false), PermissionChange::Applied);
        assert!(!t["ping"]["A"]);
        assert_eq!(toggle(&mut t, "ping", "A", true), PermissionChange::Applied);
        assert!(t["ping"]["A"]);
        assert_eq!(toggle(&mut t, "ping", "A", true), PermissionChange::Removed);
        assert!(!t.contains_key("ping"));
    }

    #[test]
    fn empty_listing_says_so() {
        assert_eq!(render_table(None), "No permissions have been set.");
        let t = table(&[("ping", &[("*", true), ("r1", false)])]);
        let text = render_table(Some(&t));
        assert!(text.contains("ping: * = allow, r1 = deny"));
    }
}
