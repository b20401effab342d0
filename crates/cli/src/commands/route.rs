use leavedesk_agent::{assemble, Collaborators};
use leavedesk_core::domain::conversation::ConversationContext;
use leavedesk_core::domain::user::{Role, UserId};
use leavedesk_db::repositories::{ConversationRepository, UserRepository};
use leavedesk_db::{connect_with_settings, migrations};

use crate::commands::{prepare, CommandResult};

/// Routes one message as `user_id`, optionally acting with `role`.
pub fn run(user_id: &str, role: Option<&str>, text: &str) -> CommandResult {
    let role = match role.map(str::parse::<Role>).transpose() {
        Ok(role) => role,
        Err(message) => return CommandResult::failure("route", "invalid_role", message, 2),
    };
    if text.trim().is_empty() {
        return CommandResult::failure("route", "invalid_message", "message text is empty", 2);
    }

    let (config, runtime) = match prepare("route") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let parts = Collaborators::from_config(&config, pool.clone())
            .map_err(|error| ("gateway_setup", error.to_string(), 2u8))?;
        let user = parts
            .users
            .find_by_id(&UserId(user_id.trim().to_string()))
            .await
            .map_err(|error| ("persistence", error.to_string(), 5u8))?
            .ok_or_else(|| ("unknown_user", format!("no user with id `{}`", user_id.trim()), 6u8))?;

        let mut profile = user.profile();
        if let Some(role) = role {
            profile.role = role;
        }
        let turns = parts
            .conversations
            .recent_turns(&profile.user_id, config.routing.context_turns)
            .await
            .map_err(|error| ("persistence", error.to_string(), 5u8))?;

        let orchestrator = assemble(&config, &parts);
        let outcome =
            orchestrator.route(text.trim(), &profile, ConversationContext::from_turns(turns)).await;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(outcome)
    });

    match result {
        Ok(outcome) => {
            CommandResult::success_with("route", outcome.response.clone(), Some(outcome))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("route", error_class, message, exit_code)
        }
    }
}
