//! The fixed set of named gateway actions.

/// Every operation the gateway can dispatch. The wire names are the
/// camelCase strings the browser client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SignIn,
    SignUp,
    SignOut,
    RefreshSession,
    GetProfile,
    GetUserRole,
    GetVoiceProfile,
    CreateVoiceProfile,
    UpdateVoiceProfile,
    GetVoicePreferences,
    UpdateVoicePreferences,
    GetCommunityVoices,
    JoinCommunityVoices,
    LeaveCommunityVoices,
    SubmitPatternRequest,
    GetPatternRequests,
    GetAds,
}

impl Action {
    /// Parse a wire name. Unknown names are a terminal client error, never a
    /// silent no-op.
    pub fn parse(name: &str) -> Option<Self> {
        let action = match name {
            "signIn" => Self::SignIn,
            "signUp" => Self::SignUp,
            "signOut" => Self::SignOut,
            "refreshSession" => Self::RefreshSession,
            "getProfile" => Self::GetProfile,
            "getUserRole" => Self::GetUserRole,
            "getVoiceProfile" => Self::GetVoiceProfile,
            "createVoiceProfile" => Self::CreateVoiceProfile,
            "updateVoiceProfile" => Self::UpdateVoiceProfile,
            "getVoicePreferences" => Self::GetVoicePreferences,
            "updateVoicePreferences" => Self::UpdateVoicePreferences,
            "getCommunityVoices" => Self::GetCommunityVoices,
            "joinCommunityVoices" => Self::JoinCommunityVoices,
            "leaveCommunityVoices" => Self::LeaveCommunityVoices,
            "submitPatternRequest" => Self::SubmitPatternRequest,
            "getPatternRequests" => Self::GetPatternRequests,
            "getAds" => Self::GetAds,
            _ => return None,
        };
        Some(action)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignIn => "signIn",
            Self::SignUp => "signUp",
            Self::SignOut => "signOut",
            Self::RefreshSession => "refreshSession",
            Self::GetProfile => "getProfile",
            Self::GetUserRole => "getUserRole",
            Self::GetVoiceProfile => "getVoiceProfile",
            Self::CreateVoiceProfile => "createVoiceProfile",
            Self::UpdateVoiceProfile => "updateVoiceProfile",
            Self::GetVoicePreferences => "getVoicePreferences",
            Self::UpdateVoicePreferences => "updateVoicePreferences",
            Self::GetCommunityVoices => "getCommunityVoices",
            Self::JoinCommunityVoices => "joinCommunityVoices",
            Self::LeaveCommunityVoices => "leaveCommunityVoices",
            Self::SubmitPatternRequest => "submitPatternRequest",
            Self::GetPatternRequests => "getPatternRequests",
            Self::GetAds => "getAds",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_action() {
        assert_eq!(Action::parse("signIn"), Some(Action::SignIn));
        assert_eq!(Action::parse("getAds"), Some(Action::GetAds));
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(Action::parse("signin"), None);
        assert_eq!(Action::parse("doesNotExist"), None);
        assert_eq!(Action::parse(""), None);
    }
}
