//! Services exposed by `msrpc serve`.

use msrpc_server::{Service, ServiceTable};

pub fn demo_services() -> ServiceTable {
    ServiceTable::new()
        .with(Service::new("Echo").method("Say", |(msg,): (String,)| Ok::<_, String>(msg)))
        .with(
            Service::new("Math")
                .method("Add", |(a, b): (f64, f64)| Ok::<_, String>(a + b))
                .method("Div", |(a, b): (f64, f64)| {
                    if b == 0.0 {
                        Err("division by zero".to_string())
                    } else {
                        Ok(a / b)
                    }
                }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use msrpc_server::DispatchError;
    use serde_json::json;

    #[test]
    fn test_demo_methods() {
        let services = demo_services();

        let say = services.lookup("Echo", "Say").unwrap();
        assert_eq!(say(vec![json!("hi")]), Ok(json!("hi")));

        let add = services.lookup("Math", "Add").unwrap();
        assert_eq!(add(vec![json!(1), json!(2.5)]), Ok(json!(3.5)));

        let div = services.lookup("Math", "Div").unwrap();
        assert_eq!(div(vec![json!(9), json!(2)]), Ok(json!(4.5)));
        assert_eq!(
            div(vec![json!(1), json!(0)]),
            Err(DispatchError::Failed("division by zero".to_string()))
        );
    }
}
