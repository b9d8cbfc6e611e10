//! Randomized browser identities.
//!
//! Each page gets a user agent picked at random from a fixed pool. This only
//! lowers the odds of one identity being blocked; it is not an evasion scheme.

use rand::seq::SliceRandom;

use sitechat_shared::{DEFAULT_USER_AGENTS, HarvestConfig};

use crate::render::{Identity, Viewport};

/// Pool of user-agent strings plus the viewport every context uses.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    user_agents: Vec<String>,
    viewport: Viewport,
}

impl IdentityPool {
    /// Build a pool; an empty list falls back to [`DEFAULT_USER_AGENTS`].
    pub fn new(user_agents: Vec<String>, viewport: Viewport) -> Self {
        let user_agents: Vec<String> = user_agents
            .into_iter()
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty())
            .collect();

        let user_agents = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            user_agents
        };

        Self {
            user_agents,
            viewport,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.user_agents.clone(),
            Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
            },
        )
    }

    /// Pick an identity uniformly at random.
    pub fn pick(&self) -> Identity {
        let user_agent = self
            .user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENTS[0].to_string());

        Identity {
            user_agent,
            viewport: self.viewport,
        }
    }

    pub fn user_agents(&self) -> &[String] {
        &self.user_agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_falls_back_to_defaults() {
        let pool = IdentityPool::new(vec![" ".into()], Viewport::default());
        assert_eq!(pool.user_agents().len(), DEFAULT_USER_AGENTS.len());
    }

    #[test]
    fn picks_come_from_the_pool() {
        let pool = IdentityPool::new(
            vec!["agent-a".into(), "agent-b".into()],
            Viewport {
                width: 800,
                height: 600,
            },
        );
        for _ in 0..50 {
            let identity = pool.pick();
            assert!(identity.user_agent == "agent-a" || identity.user_agent == "agent-b");
            assert_eq!(identity.viewport.width, 800);
        }
    }

    #[test]
    fn pool_from_config_uses_viewport() {
        let pool = IdentityPool::from_config(&HarvestConfig::default());
        let identity = pool.pick();
        assert_eq!(identity.viewport, Viewport::default());
        assert!(DEFAULT_USER_AGENTS.contains(&identity.user_agent.as_str()));
    }
}
