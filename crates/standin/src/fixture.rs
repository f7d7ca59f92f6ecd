//! Arrange/act/assert lifecycle for bridge tests
//!
//! A [`Fixture`] is configured, executed, asserted on and torn down, in
//! that order. Teardown always runs, even when configuring, executing or
//! asserting fails or panics, so a failed test never leaks its sockets.

use anyhow::Context;

use crate::application::Application;
use crate::bridge::{Bridge, BridgeResponse, BridgeState};
use crate::config::BridgeConfig;
use crate::error::BridgeError;

pub trait Fixture {
    /// Arrange the environment
    fn configure(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Perform the action under test
    fn execute(&mut self) -> anyhow::Result<()>;

    /// Release whatever `configure` acquired
    fn annihilate(&mut self) {}
}

/// Tears a fixture down when dropped
struct Teardown<'a, F: Fixture> {
    fixture: &'a mut F,
}

impl<F: Fixture> Drop for Teardown<'_, F> {
    fn drop(&mut self) {
        self.fixture.annihilate();
    }
}

/// Configure and execute `fixture`, run `assert` on it, then tear it down
pub fn run_fixture<F, A, T>(mut fixture: F, assert: A) -> anyhow::Result<T>
where
    F: Fixture,
    A: FnOnce(&mut F) -> T,
{
    let guard = Teardown {
        fixture: &mut fixture,
    };
    guard.fixture.configure().context("Fixture configure failed")?;
    guard.fixture.execute().context("Fixture execute failed")?;
    Ok(assert(guard.fixture))
}

type Action = Box<dyn FnMut(&mut Bridge) -> Result<BridgeResponse, BridgeError>>;

/// Fixture that runs an application behind a [`Bridge`]
///
/// `configure` starts the application, `execute` runs the action against
/// the bridge and keeps its response, `annihilate` stops the bridge.
pub struct BridgeFixture<A: Application> {
    bridge: Bridge,
    application: Option<A>,
    action: Action,
    response: Option<BridgeResponse>,
}

impl<A: Application> BridgeFixture<A> {
    pub fn new<F>(config: BridgeConfig, application: A, action: F) -> Self
    where
        F: FnMut(&mut Bridge) -> Result<BridgeResponse, BridgeError> + 'static,
    {
        Self {
            bridge: Bridge::new(config),
            application: Some(application),
            action: Box::new(action),
            response: None,
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut Bridge {
        &mut self.bridge
    }

    /// Response captured by `execute`
    pub fn response(&self) -> Option<&BridgeResponse> {
        self.response.as_ref()
    }
}

impl<A: Application> Fixture for BridgeFixture<A> {
    fn configure(&mut self) -> anyhow::Result<()> {
        let application = self
            .application
            .take()
            .ok_or(BridgeError::AlreadyStarted)?;
        self.bridge.start(application)?;
        Ok(())
    }

    fn execute(&mut self) -> anyhow::Result<()> {
        self.response = Some((self.action)(&mut self.bridge)?);
        Ok(())
    }

    fn annihilate(&mut self) {
        if self.bridge.state() == BridgeState::Started {
            if let Err(e) = self.bridge.stop() {
                tracing::warn!("Failed to stop bridge: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Steps {
        log: Rc<RefCell<Vec<&'static str>>>,
        fail_configure: bool,
    }

    impl Fixture for Steps {
        fn configure(&mut self) -> anyhow::Result<()> {
            self.log.borrow_mut().push("configure");
            if self.fail_configure {
                anyhow::bail!("cannot arrange");
            }
            Ok(())
        }

        fn execute(&mut self) -> anyhow::Result<()> {
            self.log.borrow_mut().push("execute");
            Ok(())
        }

        fn annihilate(&mut self) {
            self.log.borrow_mut().push("annihilate");
        }
    }

    #[test]
    fn test_lifecycle_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let fixture = Steps {
            log: log.clone(),
            ..Default::default()
        };

        let value = run_fixture(fixture, |f| {
            f.log.borrow_mut().push("assert");
            7
        })
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(
            *log.borrow(),
            vec!["configure", "execute", "assert", "annihilate"]
        );
    }

    #[test]
    fn test_teardown_runs_when_configure_fails() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let fixture = Steps {
            log: log.clone(),
            fail_configure: true,
        };

        let err = run_fixture(fixture, |_| ()).unwrap_err();
        assert!(err.to_string().contains("configure"));
        assert_eq!(*log.borrow(), vec!["configure", "annihilate"]);
    }

    #[test]
    fn test_teardown_runs_when_assert_panics() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let fixture = Steps {
            log: log.clone(),
            ..Default::default()
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_fixture(fixture, |_| panic!("assertion failed"))
        }));
        assert!(result.is_err());
        assert_eq!(*log.borrow(), vec!["configure", "execute", "annihilate"]);
    }
}
