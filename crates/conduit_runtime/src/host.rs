//! Host types exposed to runner scripts

use conduit_script::{bind_methods, bind_statics, HostClass, Methods, Session, Statics};
use serde::Serialize;

/// `Console.WriteLine(text, arg)` and `Console.log(text)`, printing to stdout.
#[derive(Default, Serialize)]
pub struct Console;

impl Console {
    fn write_line(text: String, arg: Option<serde_json::Value>) {
        match arg {
            Some(arg) => println!("{text} {arg}"),
            None => println!("{text}"),
        }
    }

    fn log(text: String) {
        println!("{text}");
    }
}

impl HostClass for Console {
    const NAME: &'static str = "Console";

    fn statics(statics: &mut Statics) {
        bind_statics!(statics: write_line as "WriteLine", log);
    }
}

/// The runner itself, as seen from script.
#[derive(Serialize)]
pub struct Host {
    name: String,
}

impl Host {
    fn version(&mut self) -> String {
        conduit_script::VERSION.to_string()
    }

    fn env(&mut self, name: String) -> Option<String> {
        std::env::var(&name).ok()
    }
}

impl Default for Host {
    fn default() -> Self {
        Self {
            name: "conduit".to_string(),
        }
    }
}

impl HostClass for Host {
    const NAME: &'static str = "Host";

    fn methods(methods: &mut Methods<Self>) {
        bind_methods!(methods: version, env);
    }
}

/// Install `Console` and `Host` into `session`.
pub fn register(session: &Session) -> conduit_script::Result<()> {
    session.add_type::<Console>("Console")?;
    session.add_instance("Host", Host::default())?;
    tracing::debug!("host types registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_members_are_callable() {
        let session = Session::new().unwrap();
        register(&session).unwrap();

        let version: String = session.evaluate("Host.version()").unwrap();
        assert_eq!(version, conduit_script::VERSION);
        assert_eq!(session.evaluate::<String>("Host.name").unwrap(), "conduit");

        let missing: Option<String> = session
            .evaluate("Host.env('CONDUIT_SURELY_UNSET_VARIABLE')")
            .unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_console_statics() {
        let session = Session::new().unwrap();
        register(&session).unwrap();

        session
            .execute("Console.WriteLine('Console Test(JS)', null); Console.log('done');")
            .unwrap();
        assert!(session.execute("Console.log()").is_err());
    }
}
