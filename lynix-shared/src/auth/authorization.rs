/// Role and feature-flag checks
///
/// Identity only says who is calling. These checks decide what that user may
/// do, based on the freshly loaded `User` row, never on token claims.
///
/// # Rules
///
/// | Feature          | Denied when                                        |
/// |------------------|----------------------------------------------------|
/// | Admin console    | role is not `admin`                                |
/// | AI assistant     | role is `trial`/`guest`, billing `Suspended`, or `ai_enabled` off |
/// | Local mail       | `localmail_enabled` off                            |
/// | Chat             | `chat_enabled` off                                 |
/// | Delete a user    | the target is an admin                             |

use crate::models::user::{User, UserRole};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Administrator access required.")]
    AdminRequired,

    #[error("The AI assistant is not available on trial or guest accounts.")]
    AssistantNotInPlan,

    #[error("Your account is suspended. Please contact support to restore access.")]
    AccountSuspended,

    #[error("The AI assistant is disabled for your account.")]
    AssistantDisabled,

    #[error("Local mail is disabled for your account.")]
    LocalMailDisabled,

    #[error("Chat is disabled for your account.")]
    ChatDisabled,

    #[error("Cannot delete an admin user.")]
    ProtectedAdmin,
}

pub fn require_admin(user: &User) -> Result<(), AccessError> {
    if !user.is_admin() {
        return Err(AccessError::AdminRequired);
    }

    Ok(())
}

/// Signed-in use of the AI assistant
pub fn require_assistant_access(user: &User) -> Result<(), AccessError> {
    if matches!(user.role, UserRole::Trial | UserRole::Guest) {
        return Err(AccessError::AssistantNotInPlan);
    }

    if user.is_suspended() {
        return Err(AccessError::AccountSuspended);
    }

    if !user.ai_enabled {
        return Err(AccessError::AssistantDisabled);
    }

    Ok(())
}

pub fn require_localmail(user: &User) -> Result<(), AccessError> {
    if !user.localmail_enabled {
        return Err(AccessError::LocalMailDisabled);
    }

    Ok(())
}

pub fn require_chat(user: &User) -> Result<(), AccessError> {
    if !user.chat_enabled {
        return Err(AccessError::ChatDisabled);
    }

    Ok(())
}

/// Admin accounts cannot be removed through the console
pub fn require_deletable(target: &User) -> Result<(), AccessError> {
    if target.is_admin() {
        return Err(AccessError::ProtectedAdmin);
    }

    Ok(())
}
