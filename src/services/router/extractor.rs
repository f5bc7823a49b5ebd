use super::error::RouterError;

// 从 "/package.Service/Method" 中取出完整服务名 "package.Service"
pub fn extract_service_name(path: &str) -> Result<String, RouterError> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(RouterError::InvalidPath(
            "Path must start with '/'".to_string(),
        ));
    }

    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if parts.len() < 2 {
        return Err(RouterError::InvalidPath(
            "Path must have at least service and method parts".to_string(),
        ));
    }

    let service_name = parts[0];
    if service_name.is_empty() {
        return Err(RouterError::InvalidPath("Empty service name".to_string()));
    }
    if parts[1].is_empty() {
        return Err(RouterError::InvalidPath("Empty method name".to_string()));
    }

    Ok(service_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_package_qualified_name() {
        assert_eq!(
            extract_service_name("/expense.ExpenseService/ListExpenses").unwrap(),
            "expense.ExpenseService"
        );
    }

    #[test]
    fn accepts_unqualified_service() {
        assert_eq!(extract_service_name("/Health/Check").unwrap(), "Health");
    }

    #[test]
    fn rejects_malformed_paths() {
        for path in [
            "",
            "expense.ExpenseService/List",
            "/expense.ExpenseService",
            "//List",
            "/pkg.Svc/",
        ] {
            assert!(
                matches!(extract_service_name(path), Err(RouterError::InvalidPath(_))),
                "path {path:?} should be rejected"
            );
        }
    }
}
