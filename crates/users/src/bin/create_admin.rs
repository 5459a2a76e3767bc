use anyhow::Result;
use std::env;

use models::Role;

/// One-shot bootstrap: seeds the first admin account into database.json and
/// prints its temporary password. Run again for the same email to rotate the
/// password instead of creating a duplicate.
fn main() -> Result<()> {
    // Usage:
    //   create_admin [database_path]
    //
    // Environment:
    //   ADMIN_EMAIL (default admin@almacen.cr)
    //   ADMIN_NAME  (default "Administrador Principal")

    let args: Vec<String> = env::args().collect();
    let database_path = args.get(1).map(|s| s.as_str()).unwrap_or("database");

    let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@almacen.cr".to_string());
    let name = env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrador Principal".to_string());

    let mut database = utils::read_database(database_path)?;
    let users_array = database
        .get_mut("users")
        .and_then(|v| v.as_array_mut())
        .ok_or_else(|| anyhow::anyhow!("database.json missing 'users' array"))?;

    let existing = users_array
        .iter()
        .position(|u| u.get("email").and_then(|e| e.as_str()) == Some(email.as_str()));

    let temp_password = match existing {
        Some(idx) => {
            let mut user: models::User = serde_json::from_value(users_array[idx].clone())?;
            let temp = users::reset_password(&mut user)?;
            users_array[idx] = serde_json::to_value(&user)?;
            println!("🔁 Existing account found, password rotated");
            temp
        }
        None => {
            let created = users::create_user(&name, &email, Role::Admin, None)?;
            users_array.push(serde_json::to_value(&created.user)?);
            println!("✓ Admin account created");
            created.temp_password
        }
    };

    let written = utils::write_database(database_path, &database)?;

    println!("  Email:              {}", email);
    println!("  Temporary password: {}", temp_password);
    println!("  (must be changed at first login)");
    println!("✅ Database written to: {}", written.display());

    Ok(())
}
