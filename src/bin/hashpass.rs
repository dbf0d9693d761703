use argon2::{Argon2, PasswordHasher};
use argon2::password_hash::{SaltString, rand_core::OsRng};

fn main() {
    let Some(password) = std::env::args().nth(1) else {
        eprintln!("Usage: hashpass <password>");
        std::process::exit(2);
    };
    let salt = SaltString::generate(&mut OsRng);
    match Argon2::default().hash_password(password.as_bytes(), &salt) {
        Ok(phc) => println!("{phc}"),
        Err(e) => {
            eprintln!("argon2 hash error: {e}");
            std::process::exit(1);
        }
    }
}
