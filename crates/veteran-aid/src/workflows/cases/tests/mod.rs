mod common;
mod routing;
mod uploads;
