mod routing_table;
mod segment;
mod tcp_sender;
mod topology;
