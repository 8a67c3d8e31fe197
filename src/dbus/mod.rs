pub mod powerd;
