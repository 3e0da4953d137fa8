mod breakpoints;
mod config_stdio;
mod disconnect;
mod exceptions;
mod logpoints_hitcounts;
mod protocol_errors;
mod session;
mod stepping;
mod tcp_attach;
mod variables;
