//! Cache key layout (§6.6, normative). No key may omit `{userId}` — every
//! builder here takes `user_id` as its first argument so a caller cannot
//! construct an unscoped key.

pub fn turn_context(user_id: &str, conversation_id: &str) -> String {
    format!("turn_context:{user_id}:{conversation_id}")
}

pub fn conversation_timeout(user_id: &str, conversation_id: &str) -> String {
    format!("conversation:timeout:{user_id}:{conversation_id}")
}

pub fn hrt_result(
    version: &str,
    user_id: &str,
    conversation_id: &str,
    scope: &str,
    phrase: &str,
    weights: &str,
) -> String {
    format!("hrt:result:{version}:{user_id}:{conversation_id}:{scope}:{phrase}:{weights}")
}

pub fn shared_embedding(user_id: &str, phrase: &str) -> String {
    format!("shared_embedding:{user_id}:{phrase}")
}

/// `conversation_id` and `hash` are optional per the spec's `[...]`
/// notation; omitted segments are simply not appended.
pub fn prompt_section(
    section_type: &str,
    user_id: &str,
    conversation_id: Option<&str>,
    hash: Option<&str>,
) -> String {
    let mut key = format!("prompt_section:{section_type}:{user_id}");
    if let Some(conversation_id) = conversation_id {
        key.push(':');
        key.push_str(conversation_id);
    }
    if let Some(hash) = hash {
        key.push(':');
        key.push_str(hash);
    }
    key
}

pub fn hrt_parameters(user_id: &str) -> String {
    format!("hrt_parameters:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_contains_user_id() {
        let user_id = "user-42";
        assert!(turn_context(user_id, "c1").contains(user_id));
        assert!(conversation_timeout(user_id, "c1").contains(user_id));
        assert!(hrt_result("v1", user_id, "c1", "s", "p", "w").contains(user_id));
        assert!(shared_embedding(user_id, "p").contains(user_id));
        assert!(prompt_section("greeting", user_id, None, None).contains(user_id));
        assert!(hrt_parameters(user_id).contains(user_id));
    }

    #[test]
    fn prompt_section_omits_absent_segments() {
        let key = prompt_section("greeting", "u1", None, None);
        assert_eq!(key, "prompt_section:greeting:u1");

        let key = prompt_section("greeting", "u1", Some("c1"), Some("abc123"));
        assert_eq!(key, "prompt_section:greeting:u1:c1:abc123");
    }
}
